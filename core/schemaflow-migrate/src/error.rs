//! Error types for migration and the schema service.

use schemaflow_changes::{DiffError, InvalidChangeError};
use schemaflow_model::{TypeCheckError, ValidationError};
use schemaflow_storage::StorageError;
use schemaflow_types::{ContainerId, VersionId};
use serde::Serialize;
use thiserror::Error;

/// Result type for migration runs.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Result type for schema service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// A stored value that could not be converted under a CHANGEFIELDTYPE.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("cannot convert value {value} of field {field} from {from} to {to}")]
pub struct FieldConversionError {
    pub field: String,
    pub from: String,
    pub to: String,
    pub value: String,
}

/// Failure reported by an index sync collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexSyncError {
    #[error("index {0} is unavailable")]
    Unavailable(String),

    #[error("index sync failed: {0}")]
    Failed(String),
}

/// Errors that abort a whole migration run before any instance is touched.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The change chain does not replay on the source definition.
    #[error("invalid change chain: {0}")]
    InvalidChange(#[from] InvalidChangeError),

    /// Replaying the change chain does not reproduce the target definition.
    #[error("changes from {from} do not produce version {to}")]
    ChainMismatch { from: VersionId, to: VersionId },

    /// Source and target belong to different containers.
    #[error("versions {from} and {to} belong to different containers")]
    ContainerMismatch { from: VersionId, to: VersionId },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors returned by the inbound schema service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed incoming definition.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An explicit change list does not apply to the head definition.
    #[error("invalid change: {0}")]
    InvalidChange(#[from] InvalidChangeError),

    /// The head advanced between diff and commit; re-diff and retry.
    #[error("container {container} was modified concurrently (expected head {expected}, found {actual})")]
    ConcurrentModification {
        container: ContainerId,
        expected: VersionId,
        actual: VersionId,
    },

    /// Field data does not conform to the container definition.
    #[error("type check failed: {0}")]
    TypeCheck(#[from] TypeCheckError),

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("container {0} already exists")]
    ContainerExists(String),

    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<DiffError> for ServiceError {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::Validation(e) => ServiceError::Validation(e),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConcurrentModification {
                container,
                expected,
                actual,
            } => ServiceError::ConcurrentModification {
                container,
                expected,
                actual,
            },
            other => ServiceError::Storage(other),
        }
    }
}
