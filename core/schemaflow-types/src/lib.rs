//! Core type definitions for schemaflow.
//!
//! This crate defines the identifiers shared by every other crate:
//! - [`ContainerId`] for schema/microschema head entities
//! - [`VersionId`] for immutable container versions
//! - [`ChangeId`] for records in a version transition's change chain
//! - [`InstanceId`] for stored content
//!
//! Domain types (field schemas, definitions, changes) live in
//! `schemaflow-model` and `schemaflow-changes`, not here.

mod ids;

pub use ids::{ChangeId, ContainerId, InstanceId, VersionId};

/// Result alias for id parsing.
pub type Result<T> = std::result::Result<T, Error>;

/// Id parsing failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
