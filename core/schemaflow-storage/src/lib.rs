//! Storage layer for schemaflow.
//!
//! Provides the version chain and the content store the migration engine
//! works against.
//!
//! # Architecture
//!
//! - [`VersionChain`] is an arena of containers, versions and change records
//!   linked by id in both directions
//! - [`ContentStore`] is the async storage seam: paged reads of bound
//!   instances, per-instance transactional commits, and compare-and-swap
//!   version commits
//! - [`MemoryStore`] implements it in memory and persists to a JSON snapshot

mod chain;
mod error;
mod memory;
mod store;

pub use chain::{ChangeRecord, Container, ContainerVersion, VersionChain};
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryStore, StoreSnapshot, mock};
pub use store::{ContentStore, InstanceUpdate, Page};
