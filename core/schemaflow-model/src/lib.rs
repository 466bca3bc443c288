//! Content model for schemaflow.
//!
//! Defines the types every other crate depends on:
//! - [`FieldSchema`] / [`FieldType`]: one typed field, identified by name
//! - [`ContainerDefinition`]: the ordered field list plus metadata of a
//!   schema or microschema version
//! - [`ContentInstance`]: stored field data bound to one container version
//! - [`ValidationError`] / [`TypeCheckError`]: what a malformed definition
//!   or non-conforming field data looks like

mod definition;
mod error;
mod field;
mod instance;
pub mod value;

pub use definition::{ContainerDefinition, ContainerKind};
pub use error::{TypeCheckError, ValidationError, ValidationResult};
pub use field::{FieldAttributes, FieldSchema, FieldType};
pub use instance::ContentInstance;
