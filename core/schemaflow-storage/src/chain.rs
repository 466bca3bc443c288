//! Version chain arena.
//!
//! Containers, versions and change records are stored in flat maps keyed by
//! id. Versions point at their neighbours through `previous`/`next` ids and
//! at the first record of the change chain that produced them; change records
//! link to each other the same way. Walking all versions of a container is
//! O(chain length), walking a transition's changes is O(changes).
//!
//! The container's `head` is the only mutable pointer. [`VersionChain::commit`]
//! advances it with a compare-and-swap against the head the caller diffed
//! against.

use crate::error::{StorageError, StorageResult};
use schemaflow_changes::SchemaChange;
use schemaflow_model::{ContainerDefinition, ContainerKind};
use schemaflow_types::{ChangeId, ContainerId, VersionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// The mutable head entity of a schema or microschema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub kind: ContainerKind,
    /// Version 1.
    pub first: VersionId,
    /// The latest version; the only one without a `next`.
    pub head: VersionId,
}

/// One immutable, numbered snapshot of a container's definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerVersion {
    pub id: VersionId,
    pub container: ContainerId,
    pub number: u32,
    pub definition: ContainerDefinition,
    pub previous: Option<VersionId>,
    /// Set once, when the following version is committed.
    pub next: Option<VersionId>,
    /// Head of the change chain that produced this version; `None` for
    /// version 1.
    pub first_change: Option<ChangeId>,
    pub created_at: i64,
}

impl ContainerVersion {
    pub fn is_head(&self) -> bool {
        self.next.is_none()
    }
}

/// One change in a version transition's change chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: ChangeId,
    /// The version this change helped produce.
    pub version: VersionId,
    pub change: SchemaChange,
    pub previous: Option<ChangeId>,
    pub next: Option<ChangeId>,
}

/// Arena of containers, versions and change records.
#[derive(Debug, Default, Clone)]
pub struct VersionChain {
    containers: HashMap<ContainerId, Container>,
    versions: HashMap<VersionId, ContainerVersion>,
    changes: HashMap<ChangeId, ChangeRecord>,
}

impl VersionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a container with `definition` as version 1.
    pub fn create_container(&mut self, definition: ContainerDefinition) -> ContainerVersion {
        let container_id = ContainerId::new();
        let version = ContainerVersion {
            id: VersionId::new(),
            container: container_id,
            number: 1,
            definition,
            previous: None,
            next: None,
            first_change: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        info!(
            container = %container_id,
            name = %version.definition.name,
            "Created container"
        );

        self.containers.insert(
            container_id,
            Container {
                id: container_id,
                kind: version.definition.kind,
                first: version.id,
                head: version.id,
            },
        );
        self.versions.insert(version.id, version.clone());
        version
    }

    /// Appends a new version after `expected_head`.
    ///
    /// Fails with [`StorageError::ConcurrentModification`] if the container's
    /// head is no longer `expected_head`. On success the previous head gains
    /// its `next` link, the change records are linked in order, and the head
    /// pointer advances.
    pub fn commit(
        &mut self,
        container: ContainerId,
        expected_head: VersionId,
        definition: ContainerDefinition,
        changes: Vec<SchemaChange>,
    ) -> StorageResult<ContainerVersion> {
        let head = self
            .containers
            .get(&container)
            .map(|c| c.head)
            .ok_or_else(|| StorageError::NotFound(format!("container {container}")))?;
        if head != expected_head {
            return Err(StorageError::ConcurrentModification {
                container,
                expected: expected_head,
                actual: head,
            });
        }
        let number = self
            .versions
            .get(&head)
            .map(|v| v.number + 1)
            .ok_or_else(|| StorageError::NotFound(format!("version {head}")))?;

        let version_id = VersionId::new();
        let change_ids: Vec<ChangeId> = changes.iter().map(|_| ChangeId::new()).collect();
        for (i, change) in changes.into_iter().enumerate() {
            let record = ChangeRecord {
                id: change_ids[i],
                version: version_id,
                change,
                previous: i.checked_sub(1).map(|p| change_ids[p]),
                next: change_ids.get(i + 1).copied(),
            };
            self.changes.insert(record.id, record);
        }

        let version = ContainerVersion {
            id: version_id,
            container,
            number,
            definition,
            previous: Some(head),
            next: None,
            first_change: change_ids.first().copied(),
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        if let Some(previous) = self.versions.get_mut(&head) {
            previous.next = Some(version_id);
        }
        if let Some(entry) = self.containers.get_mut(&container) {
            entry.head = version_id;
        }
        self.versions.insert(version_id, version.clone());

        info!(
            container = %container,
            version = number,
            changes = change_ids.len(),
            "Committed container version"
        );
        Ok(version)
    }

    pub fn container(&self, id: ContainerId) -> StorageResult<&Container> {
        self.containers
            .get(&id)
            .ok_or_else(|| StorageError::NotFound(format!("container {id}")))
    }

    /// Finds a container by the name of its head definition. Should a name
    /// ever be shared, the oldest container wins.
    pub fn find_container(&self, name: &str) -> Option<&Container> {
        self.containers
            .values()
            .filter(|c| {
                self.versions
                    .get(&c.head)
                    .is_some_and(|v| v.definition.name == name)
            })
            .min_by_key(|c| c.id)
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn version(&self, id: VersionId) -> StorageResult<&ContainerVersion> {
        self.versions
            .get(&id)
            .ok_or_else(|| StorageError::NotFound(format!("version {id}")))
    }

    pub fn head(&self, container: ContainerId) -> StorageResult<&ContainerVersion> {
        let head = self.container(container)?.head;
        self.version(head)
    }

    /// All versions of a container, version 1 first.
    pub fn versions(&self, container: ContainerId) -> StorageResult<Vec<&ContainerVersion>> {
        let mut out = Vec::new();
        let mut cursor = Some(self.container(container)?.first);
        while let Some(id) = cursor {
            let version = self.version(id)?;
            if out.len() == self.versions.len() {
                return Err(StorageError::InvalidData(format!(
                    "cycle in version chain of container {container}"
                )));
            }
            out.push(version);
            cursor = version.next;
        }
        Ok(out)
    }

    /// The change chain that produced `version`, in application order.
    pub fn changes(&self, version: VersionId) -> StorageResult<Vec<&SchemaChange>> {
        let mut out = Vec::new();
        let mut cursor = self.version(version)?.first_change;
        while let Some(id) = cursor {
            let record = self
                .changes
                .get(&id)
                .ok_or_else(|| StorageError::NotFound(format!("change {id}")))?;
            if out.len() == self.changes.len() {
                return Err(StorageError::InvalidData(format!(
                    "cycle in change chain of version {version}"
                )));
            }
            out.push(&record.change);
            cursor = record.next;
        }
        Ok(out)
    }

    /// Flattens the arena into sorted record lists.
    pub fn records(&self) -> (Vec<Container>, Vec<ContainerVersion>, Vec<ChangeRecord>) {
        let mut containers: Vec<_> = self.containers.values().cloned().collect();
        let mut versions: Vec<_> = self.versions.values().cloned().collect();
        let mut changes: Vec<_> = self.changes.values().cloned().collect();
        containers.sort_by_key(|c| c.id);
        versions.sort_by_key(|v| v.id);
        changes.sort_by_key(|c| c.id);
        (containers, versions, changes)
    }

    /// Rebuilds an arena from record lists, checking that every link
    /// resolves.
    pub fn from_records(
        containers: Vec<Container>,
        versions: Vec<ContainerVersion>,
        changes: Vec<ChangeRecord>,
    ) -> StorageResult<Self> {
        let chain = Self {
            containers: containers.into_iter().map(|c| (c.id, c)).collect(),
            versions: versions.into_iter().map(|v| (v.id, v)).collect(),
            changes: changes.into_iter().map(|c| (c.id, c)).collect(),
        };

        for container in chain.containers.values() {
            let versions = chain.versions(container.id)?;
            let mut expected = 1;
            for version in &versions {
                if version.number != expected || version.container != container.id {
                    return Err(StorageError::InvalidData(format!(
                        "version {} breaks the chain of container {}",
                        version.id, container.id
                    )));
                }
                expected += 1;
            }
            if versions.last().map(|v| v.id) != Some(container.head) {
                return Err(StorageError::InvalidData(format!(
                    "head of container {} is not the end of its chain",
                    container.id
                )));
            }
        }
        for version in chain.versions.values() {
            chain.changes(version.id)?;
        }
        Ok(chain)
    }
}
