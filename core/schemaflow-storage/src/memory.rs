//! In-memory content store with JSON snapshot persistence.

use crate::chain::{ChangeRecord, Container, ContainerVersion, VersionChain};
use crate::error::{StorageError, StorageResult};
use crate::store::{ContentStore, InstanceUpdate, Page};
use async_trait::async_trait;
use schemaflow_changes::SchemaChange;
use schemaflow_model::{ContainerDefinition, ContentInstance};
use schemaflow_types::{ContainerId, InstanceId, VersionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Serialized form of a [`MemoryStore`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub containers: Vec<Container>,
    pub versions: Vec<ContainerVersion>,
    pub changes: Vec<ChangeRecord>,
    pub instances: Vec<ContentInstance>,
}

#[derive(Debug, Default)]
struct State {
    chain: VersionChain,
    instances: BTreeMap<InstanceId, ContentInstance>,
    bindings: HashMap<VersionId, BTreeSet<InstanceId>>,
}

impl State {
    fn bind(&mut self, instance: InstanceId, version: VersionId) {
        self.bindings.entry(version).or_default().insert(instance);
    }

    fn unbind(&mut self, instance: InstanceId, version: VersionId) {
        if let Some(set) = self.bindings.get_mut(&version) {
            set.remove(&instance);
        }
    }
}

/// A [`ContentStore`] holding everything behind a single async mutex.
///
/// Every trait operation is one critical section, so version commits and
/// instance commits are each atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the full store contents.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.lock().await;
        let (containers, versions, changes) = state.chain.records();
        StoreSnapshot {
            containers,
            versions,
            changes,
            instances: state.instances.values().cloned().collect(),
        }
    }

    /// Rebuilds a store from a snapshot, checking chain links and instance
    /// bindings.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> StorageResult<Self> {
        let chain =
            VersionChain::from_records(snapshot.containers, snapshot.versions, snapshot.changes)?;
        let mut state = State {
            chain,
            ..Default::default()
        };
        for instance in snapshot.instances {
            let version = state.chain.version(instance.version)?;
            if version.container != instance.container {
                return Err(StorageError::InvalidData(format!(
                    "instance {} is bound to a version of another container",
                    instance.id
                )));
            }
            state.bind(instance.id, instance.version);
            state.instances.insert(instance.id, instance);
        }
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Writes the store to `path` as pretty-printed JSON.
    pub async fn save(&self, path: &Path) -> StorageResult<()> {
        let snapshot = self.snapshot().await;
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(path, bytes).await?;
        info!(
            path = %path.display(),
            containers = snapshot.containers.len(),
            instances = snapshot.instances.len(),
            "Saved store snapshot"
        );
        Ok(())
    }

    /// Loads a store previously written by [`MemoryStore::save`].
    pub async fn load(path: &Path) -> StorageResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), "Loaded store snapshot");
        Self::from_snapshot(snapshot)
    }

    /// Loads `path` if it exists, otherwise returns an empty store.
    pub async fn open(path: &Path) -> StorageResult<Self> {
        if tokio::fs::try_exists(path).await? {
            Self::load(path).await
        } else {
            Ok(Self::new())
        }
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn create_container(
        &self,
        definition: ContainerDefinition,
    ) -> StorageResult<ContainerVersion> {
        let mut state = self.state.lock().await;
        Ok(state.chain.create_container(definition))
    }

    async fn container(&self, id: ContainerId) -> StorageResult<Container> {
        self.state.lock().await.chain.container(id).cloned()
    }

    async fn find_container(&self, name: &str) -> StorageResult<Option<Container>> {
        Ok(self.state.lock().await.chain.find_container(name).cloned())
    }

    async fn version(&self, id: VersionId) -> StorageResult<ContainerVersion> {
        self.state.lock().await.chain.version(id).cloned()
    }

    async fn head_version(&self, container: ContainerId) -> StorageResult<ContainerVersion> {
        self.state.lock().await.chain.head(container).cloned()
    }

    async fn versions(&self, container: ContainerId) -> StorageResult<Vec<ContainerVersion>> {
        let state = self.state.lock().await;
        Ok(state
            .chain
            .versions(container)?
            .into_iter()
            .cloned()
            .collect())
    }

    async fn changes(&self, version: VersionId) -> StorageResult<Vec<SchemaChange>> {
        let state = self.state.lock().await;
        Ok(state.chain.changes(version)?.into_iter().cloned().collect())
    }

    async fn commit_version(
        &self,
        container: ContainerId,
        expected_head: VersionId,
        definition: ContainerDefinition,
        changes: Vec<SchemaChange>,
    ) -> StorageResult<ContainerVersion> {
        let mut state = self.state.lock().await;
        state
            .chain
            .commit(container, expected_head, definition, changes)
    }

    async fn bound_instances(
        &self,
        version: VersionId,
        page: Page,
    ) -> StorageResult<Vec<InstanceId>> {
        let state = self.state.lock().await;
        state.chain.version(version)?;
        let Some(bound) = state.bindings.get(&version) else {
            return Ok(Vec::new());
        };
        let lower = match page.after {
            Some(after) => Bound::Excluded(after),
            None => Bound::Unbounded,
        };
        Ok(bound
            .range((lower, Bound::Unbounded))
            .take(page.limit)
            .copied()
            .collect())
    }

    async fn count_bound(&self, version: VersionId) -> StorageResult<usize> {
        let state = self.state.lock().await;
        state.chain.version(version)?;
        Ok(state.bindings.get(&version).map_or(0, BTreeSet::len))
    }

    async fn load_instance(&self, id: InstanceId) -> StorageResult<ContentInstance> {
        self.state
            .lock()
            .await
            .instances
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("instance {id}")))
    }

    async fn insert_instance(&self, instance: ContentInstance) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        let version = state.chain.version(instance.version)?;
        if version.container != instance.container {
            return Err(StorageError::InvalidData(format!(
                "version {} does not belong to container {}",
                instance.version, instance.container
            )));
        }
        if state.instances.contains_key(&instance.id) {
            return Err(StorageError::InvalidData(format!(
                "instance {} already exists",
                instance.id
            )));
        }
        state.bind(instance.id, instance.version);
        state.instances.insert(instance.id, instance);
        Ok(())
    }

    async fn commit_instance(&self, update: InstanceUpdate) -> StorageResult<ContentInstance> {
        let mut state = self.state.lock().await;
        let target_container = state.chain.version(update.version)?.container;
        let current = state
            .instances
            .get(&update.instance)
            .ok_or_else(|| StorageError::NotFound(format!("instance {}", update.instance)))?;
        if current.version != update.expected_version {
            return Err(StorageError::BindingChanged {
                instance: update.instance,
                expected: update.expected_version,
                actual: current.version,
            });
        }
        if current.container != target_container {
            return Err(StorageError::InvalidData(format!(
                "version {} does not belong to container {}",
                update.version, current.container
            )));
        }

        let mut instance = current.clone();
        instance.version = update.version;
        instance.fields = update.fields;
        instance.modified_at = chrono::Utc::now().timestamp_millis();

        state.unbind(instance.id, update.expected_version);
        state.bind(instance.id, update.version);
        state.instances.insert(instance.id, instance.clone());
        debug!(instance = %instance.id, version = %instance.version, "Committed instance");
        Ok(instance)
    }
}

/// Fault-injecting stores for testing.
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps a [`MemoryStore`] and fails instance commits with
    /// [`StorageError::Unavailable`].
    ///
    /// Each instance in `flaky` fails its first `failures` commits; instances
    /// in `broken` always fail.
    #[derive(Debug)]
    pub struct FlakyStore {
        inner: Arc<MemoryStore>,
        failures: usize,
        flaky: Mutex<HashMap<InstanceId, usize>>,
        broken: Mutex<HashSet<InstanceId>>,
        attempts: AtomicUsize,
    }

    impl FlakyStore {
        pub fn new(inner: Arc<MemoryStore>, failures: usize) -> Self {
            Self {
                inner,
                failures,
                flaky: Mutex::new(HashMap::new()),
                broken: Mutex::new(HashSet::new()),
                attempts: AtomicUsize::new(0),
            }
        }

        /// Marks an instance as failing its next `failures` commits.
        pub async fn make_flaky(&self, id: InstanceId) {
            self.flaky.lock().await.insert(id, self.failures);
        }

        /// Marks an instance as failing every commit.
        pub async fn make_broken(&self, id: InstanceId) {
            self.broken.lock().await.insert(id);
        }

        /// Total `commit_instance` calls seen, including failed ones.
        pub fn commit_attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        pub fn inner(&self) -> &MemoryStore {
            &self.inner
        }
    }

    #[async_trait]
    impl ContentStore for FlakyStore {
        async fn create_container(
            &self,
            definition: ContainerDefinition,
        ) -> StorageResult<ContainerVersion> {
            self.inner.create_container(definition).await
        }

        async fn container(&self, id: ContainerId) -> StorageResult<Container> {
            self.inner.container(id).await
        }

        async fn find_container(&self, name: &str) -> StorageResult<Option<Container>> {
            self.inner.find_container(name).await
        }

        async fn version(&self, id: VersionId) -> StorageResult<ContainerVersion> {
            self.inner.version(id).await
        }

        async fn head_version(&self, container: ContainerId) -> StorageResult<ContainerVersion> {
            self.inner.head_version(container).await
        }

        async fn versions(&self, container: ContainerId) -> StorageResult<Vec<ContainerVersion>> {
            self.inner.versions(container).await
        }

        async fn changes(&self, version: VersionId) -> StorageResult<Vec<SchemaChange>> {
            self.inner.changes(version).await
        }

        async fn commit_version(
            &self,
            container: ContainerId,
            expected_head: VersionId,
            definition: ContainerDefinition,
            changes: Vec<SchemaChange>,
        ) -> StorageResult<ContainerVersion> {
            self.inner
                .commit_version(container, expected_head, definition, changes)
                .await
        }

        async fn bound_instances(
            &self,
            version: VersionId,
            page: Page,
        ) -> StorageResult<Vec<InstanceId>> {
            self.inner.bound_instances(version, page).await
        }

        async fn count_bound(&self, version: VersionId) -> StorageResult<usize> {
            self.inner.count_bound(version).await
        }

        async fn load_instance(&self, id: InstanceId) -> StorageResult<ContentInstance> {
            self.inner.load_instance(id).await
        }

        async fn insert_instance(&self, instance: ContentInstance) -> StorageResult<()> {
            self.inner.insert_instance(instance).await
        }

        async fn commit_instance(&self, update: InstanceUpdate) -> StorageResult<ContentInstance> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.broken.lock().await.contains(&update.instance) {
                return Err(StorageError::Unavailable(format!(
                    "instance {} is unreachable",
                    update.instance
                )));
            }
            {
                let mut flaky = self.flaky.lock().await;
                if let Some(remaining) = flaky.get_mut(&update.instance) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(StorageError::Unavailable(format!(
                            "transient failure for instance {}",
                            update.instance
                        )));
                    }
                }
            }
            self.inner.commit_instance(update).await
        }
    }
}
