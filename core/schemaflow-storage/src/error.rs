//! Storage errors.

use schemaflow_types::{ContainerId, InstanceId, VersionId};
use thiserror::Error;

/// Result alias used throughout the store and the version chain.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failures reported by a [`crate::ContentStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// No container, version or instance with that id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Another commit advanced the container head first.
    #[error("container {container} was modified concurrently: expected head {expected}, found {actual}")]
    ConcurrentModification {
        container: ContainerId,
        expected: VersionId,
        actual: VersionId,
    },

    /// The instance is no longer bound to the version the caller read it at.
    #[error("instance {instance} is bound to {actual}, expected {expected}")]
    BindingChanged {
        instance: InstanceId,
        expected: VersionId,
        actual: VersionId,
    },

    /// Transient backend failure.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A snapshot or record that violates the chain structure.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Snapshot encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot file access failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether retrying the same transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Io(_))
    }
}
