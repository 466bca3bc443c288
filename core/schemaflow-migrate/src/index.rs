//! Search index sync hook.
//!
//! The coordinator tells the index collaborator about structural changes to
//! searchable fields before migrating any instance, and asks it to reindex
//! every instance it migrates. Both calls are fire-and-forget: failures are
//! logged and never fail a migration.

use crate::error::IndexSyncError;
use async_trait::async_trait;
use schemaflow_changes::SchemaChange;
use schemaflow_model::{ContainerDefinition, FieldSchema};
use schemaflow_storage::ContainerVersion;
use schemaflow_types::InstanceId;
use serde::Serialize;

/// How one searchable field's mapping changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MappingDelta {
    AddField { field: FieldSchema },
    RemoveField { field: String },
    ChangeFieldType { field: FieldSchema },
    RenameField { from: String, to: String },
}

impl MappingDelta {
    /// The mapping delta for `change` applied to `before`, if the change is
    /// structural and touches a searchable field.
    pub fn for_change(before: &ContainerDefinition, change: &SchemaChange) -> Option<Self> {
        let searchable = |name: &str| before.field(name).is_some_and(|f| f.attributes.searchable);
        match change {
            SchemaChange::AddField { field } => field
                .attributes
                .searchable
                .then(|| MappingDelta::AddField {
                    field: field.clone(),
                }),
            SchemaChange::RemoveField { field } => {
                searchable(field).then(|| MappingDelta::RemoveField {
                    field: field.clone(),
                })
            }
            SchemaChange::ChangeFieldType {
                field,
                new_type,
                list_type,
                attributes,
            } => (searchable(field) || attributes.searchable).then(|| {
                MappingDelta::ChangeFieldType {
                    field: FieldSchema {
                        name: field.clone(),
                        field_type: *new_type,
                        list_type: *list_type,
                        attributes: attributes.clone(),
                    },
                }
            }),
            SchemaChange::RenameField { field, new_name } => {
                searchable(field).then(|| MappingDelta::RenameField {
                    from: field.clone(),
                    to: new_name.clone(),
                })
            }
            SchemaChange::UpdateField { .. } | SchemaChange::UpdateSchema(_) => None,
        }
    }
}

/// External search index collaborator.
#[async_trait]
pub trait IndexSync: Send + Sync {
    /// Names of the indices holding documents of `version`'s container.
    fn indices(&self, version: &ContainerVersion) -> Vec<String> {
        vec![format!("container-{}", version.container)]
    }

    /// Applies one field mapping change to an index.
    async fn update_mapping(&self, index: &str, delta: &MappingDelta)
    -> Result<(), IndexSyncError>;

    /// Re-indexes one instance after it was migrated.
    async fn reindex(&self, instance: InstanceId) -> Result<(), IndexSyncError>;
}

/// An index collaborator that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndexSync;

#[async_trait]
impl IndexSync for NoopIndexSync {
    async fn update_mapping(
        &self,
        _index: &str,
        _delta: &MappingDelta,
    ) -> Result<(), IndexSyncError> {
        Ok(())
    }

    async fn reindex(&self, _instance: InstanceId) -> Result<(), IndexSyncError> {
        Ok(())
    }
}

/// A recording index collaborator for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    /// One call received by [`RecordingIndexSync`].
    #[derive(Debug, Clone, PartialEq)]
    pub enum IndexCall {
        UpdateMapping { index: String, delta: MappingDelta },
        Reindex(InstanceId),
    }

    /// Records every call; optionally fails all of them.
    #[derive(Debug, Default)]
    pub struct RecordingIndexSync {
        calls: Mutex<Vec<IndexCall>>,
        failing: AtomicBool,
    }

    impl RecordingIndexSync {
        pub fn new() -> Self {
            Self::default()
        }

        /// A collaborator whose calls are recorded and then fail.
        pub fn failing() -> Self {
            let sync = Self::default();
            sync.failing.store(true, Ordering::SeqCst);
            sync
        }

        pub async fn calls(&self) -> Vec<IndexCall> {
            self.calls.lock().await.clone()
        }

        pub async fn mapping_updates(&self) -> Vec<(String, MappingDelta)> {
            self.calls
                .lock()
                .await
                .iter()
                .filter_map(|c| match c {
                    IndexCall::UpdateMapping { index, delta } => {
                        Some((index.clone(), delta.clone()))
                    }
                    IndexCall::Reindex(_) => None,
                })
                .collect()
        }

        pub async fn reindexed(&self) -> Vec<InstanceId> {
            self.calls
                .lock()
                .await
                .iter()
                .filter_map(|c| match c {
                    IndexCall::Reindex(id) => Some(*id),
                    IndexCall::UpdateMapping { .. } => None,
                })
                .collect()
        }

        fn outcome(&self, what: &str) -> Result<(), IndexSyncError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(IndexSyncError::Unavailable(what.to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl IndexSync for RecordingIndexSync {
        async fn update_mapping(
            &self,
            index: &str,
            delta: &MappingDelta,
        ) -> Result<(), IndexSyncError> {
            self.calls.lock().await.push(IndexCall::UpdateMapping {
                index: index.to_string(),
                delta: delta.clone(),
            });
            self.outcome(index)
        }

        async fn reindex(&self, instance: InstanceId) -> Result<(), IndexSyncError> {
            self.calls.lock().await.push(IndexCall::Reindex(instance));
            self.outcome("reindex")
        }
    }
}
