//! Error types for definition validation and instance type-checking.

use crate::{ContainerKind, FieldType};
use thiserror::Error;

/// Result type for definition validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// A malformed container definition. Always recoverable: the caller
/// corrects the input and resubmits.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("container name must not be empty")]
    EmptyName,

    #[error("field name must not be empty")]
    EmptyFieldName,

    #[error("duplicate field name: {0}")]
    DuplicateField(String),

    #[error("display field {0} does not reference an existing field")]
    DanglingDisplayField(String),

    #[error("display field {field} must be a string field, found {found}")]
    DisplayFieldType { field: String, found: FieldType },

    #[error("segment field {0} does not reference an existing field")]
    DanglingSegmentField(String),

    #[error("segment field {field} must be a string or binary field, found {found}")]
    SegmentFieldType { field: String, found: FieldType },

    #[error("list field {0} has no list_type")]
    MissingListType(String),

    #[error("list field {0} may not contain lists")]
    NestedList(String),

    #[error("field {0} declares a list_type but is not a list")]
    UnexpectedListType(String),

    #[error("field {field} has min {min} greater than max {max}")]
    InvalidRange { field: String, min: f64, max: f64 },

    #[error("microschemas do not support a segment field")]
    MicroschemaSegmentField,

    #[error("microschemas do not support the container flag")]
    MicroschemaContainerFlag,

    #[error("microschema field {0} may not hold micronodes")]
    MicroschemaMicronodeField(String),

    #[error("cannot compare a {old:?} with a {new:?}")]
    KindMismatch { old: ContainerKind, new: ContainerKind },
}

/// Field data that does not conform to a container definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeCheckError {
    #[error("field {0} is not declared by the container")]
    UnknownField(String),

    #[error("field {field} expects {expected}, found {found}")]
    Mismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("required field {0} has no value")]
    MissingRequired(String),

    #[error("field {field} does not allow {value}")]
    NotAllowed { field: String, value: String },

    #[error("field {field} value {value} is outside the allowed range")]
    OutOfRange { field: String, value: f64 },
}
