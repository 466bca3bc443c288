//! Content migration for schemaflow.
//!
//! - [`MigrationCoordinator`] moves instances from one container version to
//!   the next with a bounded worker pool
//! - [`convert`] is the value conversion table used for CHANGEFIELDTYPE
//! - [`IndexSync`] is the search index hook, told about mapping changes
//!   before instances are migrated
//! - [`SchemaService`] is the inbound API: propose a definition or a change
//!   list, get a [`MigrationReport`] back

mod config;
mod conversion;
mod coordinator;
mod error;
pub mod index;
mod report;
mod service;

pub use config::MigrationConfig;
pub use conversion::convert;
pub use coordinator::{CancelHandle, MigrationCoordinator};
pub use error::{
    FieldConversionError, IndexSyncError, MigrateResult, MigrationError, ServiceError,
    ServiceResult,
};
pub use index::{IndexSync, MappingDelta, NoopIndexSync};
pub use report::{FailureReason, InstanceFailure, InstanceState, MigrationReport};
pub use service::SchemaService;
