//! Schema change engine for schemaflow.
//!
//! - [`SchemaChange`]: the closed set of atomic schema edits
//! - [`diff`]: the container comparator, `(old, new) -> [SchemaChange]`
//! - [`apply`]: the change applicator, `(old, [SchemaChange]) -> new`
//!
//! Both functions are pure and deterministic, and for every pair of valid
//! definitions of the same kind:
//! - `apply(a, diff(a, b)) == b`
//! - `diff(a, a)` is empty
//! - `apply(a, [])  == a`

mod applicator;
mod change;
mod comparator;
mod error;

pub use applicator::{apply, apply_change};
pub use change::{ChangeOperation, SchemaChange, SchemaUpdate};
pub use comparator::diff;
pub use error::{ApplyResult, DiffError, DiffResult, InvalidChangeError};
