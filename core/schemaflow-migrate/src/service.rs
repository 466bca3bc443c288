//! Inbound schema service.
//!
//! Ties the comparator, applicator, version chain and coordinator together:
//! a proposed definition is diffed against the container head, the result is
//! committed as a new version, and the bound instances are migrated.

use crate::coordinator::{CancelHandle, MigrationCoordinator};
use crate::error::{ServiceError, ServiceResult};
use crate::report::MigrationReport;
use schemaflow_changes::{SchemaChange, apply, diff};
use schemaflow_model::{ContainerDefinition, ContentInstance};
use schemaflow_storage::{ContainerVersion, ContentStore};
use schemaflow_types::{ContainerId, VersionId};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Entry point for schema updates and content creation.
#[derive(Clone)]
pub struct SchemaService {
    store: Arc<dyn ContentStore>,
    coordinator: MigrationCoordinator,
}

impl SchemaService {
    pub fn new(store: Arc<dyn ContentStore>, coordinator: MigrationCoordinator) -> Self {
        Self { store, coordinator }
    }

    pub fn coordinator(&self) -> &MigrationCoordinator {
        &self.coordinator
    }

    /// Creates a container with `definition` as version 1.
    pub async fn create_container(
        &self,
        definition: ContainerDefinition,
    ) -> ServiceResult<ContainerVersion> {
        definition.validate()?;
        if self.store.find_container(&definition.name).await?.is_some() {
            return Err(ServiceError::ContainerExists(definition.name));
        }
        Ok(self.store.create_container(definition).await?)
    }

    /// Looks a container up by name.
    pub async fn container_by_name(&self, name: &str) -> ServiceResult<ContainerId> {
        self.store
            .find_container(name)
            .await?
            .map(|c| c.id)
            .ok_or_else(|| ServiceError::ContainerNotFound(name.to_string()))
    }

    /// Stores new content bound to the container's head version.
    pub async fn create_instance(
        &self,
        container: ContainerId,
        fields: Map<String, Value>,
    ) -> ServiceResult<ContentInstance> {
        let head = self.store.head_version(container).await?;
        head.definition.type_check(&fields)?;
        let instance = ContentInstance::new(container, head.id, fields);
        self.store.insert_instance(instance.clone()).await?;
        debug!(instance = %instance.id, version = head.number, "Created instance");
        Ok(instance)
    }

    /// Diffs `definition` against the head, commits the result as a new
    /// version and migrates the head's instances onto it.
    ///
    /// An empty diff creates no version and returns a no-op report. If
    /// another commit wins the race this fails with
    /// [`ServiceError::ConcurrentModification`]; re-propose to retry.
    pub async fn propose_schema_update(
        &self,
        container: ContainerId,
        definition: ContainerDefinition,
    ) -> ServiceResult<MigrationReport> {
        self.propose_schema_update_with_cancel(container, definition, &CancelHandle::new())
            .await
    }

    pub async fn propose_schema_update_with_cancel(
        &self,
        container: ContainerId,
        definition: ContainerDefinition,
        cancel: &CancelHandle,
    ) -> ServiceResult<MigrationReport> {
        let head = self.store.head_version(container).await?;
        let changes = diff(&head.definition, &definition)?;
        if changes.is_empty() {
            info!("Proposed definition equals version {}, nothing to do", head.number);
            return Ok(MigrationReport::noop(head.id));
        }
        self.commit_and_migrate(head, changes, cancel).await
    }

    /// Applies an explicit change list to the head, commits the result and
    /// migrates. This is the only way a RENAMEFIELD enters the chain.
    pub async fn propose_changes(
        &self,
        container: ContainerId,
        changes: Vec<SchemaChange>,
    ) -> ServiceResult<MigrationReport> {
        let head = self.store.head_version(container).await?;
        if changes.is_empty() {
            return Ok(MigrationReport::noop(head.id));
        }
        self.commit_and_migrate(head, changes, &CancelHandle::new())
            .await
    }

    async fn commit_and_migrate(
        &self,
        head: ContainerVersion,
        changes: Vec<SchemaChange>,
        cancel: &CancelHandle,
    ) -> ServiceResult<MigrationReport> {
        let next = apply(&head.definition, &changes)?;
        if next.name != head.definition.name {
            if let Some(other) = self.store.find_container(&next.name).await? {
                if other.id != head.container {
                    return Err(ServiceError::ContainerExists(next.name));
                }
            }
        }
        let version = self
            .store
            .commit_version(head.container, head.id, next, changes.clone())
            .await?;
        Ok(self
            .coordinator
            .migrate_with_cancel(&head, &version, &changes, cancel)
            .await?)
    }

    /// Migrates instances still bound to older versions onto the head,
    /// replaying the concatenated change chains of every later transition.
    /// Returns one report per older version that still had instances.
    pub async fn migrate_pending(
        &self,
        container: ContainerId,
    ) -> ServiceResult<Vec<MigrationReport>> {
        let versions = self.store.versions(container).await?;
        let Some((head, older)) = versions.split_last() else {
            return Ok(Vec::new());
        };

        let mut reports = Vec::new();
        for (i, version) in older.iter().enumerate() {
            if self.store.count_bound(version.id).await? == 0 {
                continue;
            }
            let mut changes = Vec::new();
            for later in &versions[i + 1..] {
                changes.extend(self.store.changes(later.id).await?);
            }
            info!(
                "Migrating pending instances from version {} to {}",
                version.number, head.number
            );
            reports.push(self.coordinator.migrate(version, head, &changes).await?);
        }
        Ok(reports)
    }

    /// All versions of a container, version 1 first.
    pub async fn versions(&self, container: ContainerId) -> ServiceResult<Vec<ContainerVersion>> {
        Ok(self.store.versions(container).await?)
    }

    /// The change chain that produced `version`.
    pub async fn changes(&self, version: VersionId) -> ServiceResult<Vec<SchemaChange>> {
        Ok(self.store.changes(version).await?)
    }
}
