//! The storage collaborator seam.
//!
//! Defines the operations the migration engine needs from a backend:
//! paged reads of a version's bound instances, a transactional
//! read-modify-write of one instance, and a transactional append of a
//! container version together with its head pointer update.

use crate::chain::{Container, ContainerVersion};
use crate::error::StorageResult;
use async_trait::async_trait;
use schemaflow_changes::SchemaChange;
use schemaflow_model::{ContainerDefinition, ContentInstance};
use schemaflow_types::{ContainerId, InstanceId, VersionId};
use serde_json::{Map, Value};

/// A keyset page of instance ids bound to one version.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    /// Only ids strictly greater than this are returned.
    pub after: Option<InstanceId>,
    pub limit: usize,
}

impl Page {
    pub fn first(limit: usize) -> Self {
        Self { after: None, limit }
    }
}

/// New field data and version binding for one instance.
///
/// Committed only if the instance is still bound to `expected_version`.
#[derive(Debug, Clone)]
pub struct InstanceUpdate {
    pub instance: InstanceId,
    pub expected_version: VersionId,
    pub version: VersionId,
    pub fields: Map<String, Value>,
}

/// Backend for container versions and content instances.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Creates a container whose version 1 holds `definition`.
    async fn create_container(
        &self,
        definition: ContainerDefinition,
    ) -> StorageResult<ContainerVersion>;

    async fn container(&self, id: ContainerId) -> StorageResult<Container>;

    /// Looks a container up by the name of its head definition.
    async fn find_container(&self, name: &str) -> StorageResult<Option<Container>>;

    async fn version(&self, id: VersionId) -> StorageResult<ContainerVersion>;

    async fn head_version(&self, container: ContainerId) -> StorageResult<ContainerVersion>;

    /// All versions of a container, version 1 first.
    async fn versions(&self, container: ContainerId) -> StorageResult<Vec<ContainerVersion>>;

    /// The change chain that produced `version`, in application order.
    async fn changes(&self, version: VersionId) -> StorageResult<Vec<SchemaChange>>;

    /// Atomically appends a version after `expected_head` and advances the
    /// head pointer. Fails with `ConcurrentModification` if the head moved.
    async fn commit_version(
        &self,
        container: ContainerId,
        expected_head: VersionId,
        definition: ContainerDefinition,
        changes: Vec<SchemaChange>,
    ) -> StorageResult<ContainerVersion>;

    /// Ids of instances bound to `version`, ascending.
    async fn bound_instances(&self, version: VersionId, page: Page)
    -> StorageResult<Vec<InstanceId>>;

    async fn count_bound(&self, version: VersionId) -> StorageResult<usize>;

    async fn load_instance(&self, id: InstanceId) -> StorageResult<ContentInstance>;

    async fn insert_instance(&self, instance: ContentInstance) -> StorageResult<()>;

    /// Replaces an instance's field data and version binding in one
    /// transaction. Fails with `BindingChanged` if the instance is no longer
    /// bound to `update.expected_version`.
    async fn commit_instance(&self, update: InstanceUpdate) -> StorageResult<ContentInstance>;
}
