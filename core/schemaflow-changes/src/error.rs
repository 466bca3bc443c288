//! Error types for diffing and change application.

use crate::change::ChangeOperation;
use schemaflow_model::ValidationError;
use thiserror::Error;

/// Result type for [`crate::diff`].
pub type DiffResult<T> = Result<T, DiffError>;

/// Result type for [`crate::apply`].
pub type ApplyResult<T> = Result<T, InvalidChangeError>;

/// Errors raised before any change is computed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiffError {
    /// The incoming definition is malformed.
    #[error("invalid definition: {0}")]
    Validation(#[from] ValidationError),
}

/// A change chain that cannot be replayed. Indicates a corrupt chain and is
/// fatal to the transition; it is never skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidChangeError {
    /// The change targets a field that does not exist at that point of the chain.
    #[error("change #{index} ({operation}) references unknown field {field}")]
    UnknownField {
        index: usize,
        operation: ChangeOperation,
        field: String,
    },

    /// The change would introduce a second field with the same name.
    #[error("change #{index} ({operation}) would duplicate field {field}")]
    DuplicateField {
        index: usize,
        operation: ChangeOperation,
        field: String,
    },

    /// The field order is not a permutation of the current fields.
    #[error("change #{index} carries an invalid field order: {reason}")]
    InvalidFieldOrder { index: usize, reason: String },

    /// The chain replayed, but the resulting definition is malformed.
    #[error("resulting definition is invalid: {0}")]
    InvalidResult(#[from] ValidationError),
}
