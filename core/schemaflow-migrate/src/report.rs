//! Per-instance migration outcomes and the aggregated report.

use crate::error::FieldConversionError;
use schemaflow_types::{InstanceId, VersionId};
use serde::Serialize;
use std::fmt;

/// Lifecycle of one instance within a migration run.
///
/// `Queued -> InProgress -> {Migrated | Failed}`. Instances a cancelled or
/// timed-out run never picked up stay `Queued`, bound to the source version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Queued,
    InProgress,
    Migrated,
    Failed,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Queued => "QUEUED",
            InstanceState::InProgress => "IN_PROGRESS",
            InstanceState::Migrated => "MIGRATED",
            InstanceState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Why an instance stayed on the source version.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// A stored value could not be converted under a CHANGEFIELDTYPE.
    Conversion(FieldConversionError),
    /// The migrated field data does not conform to the target definition.
    TypeCheck { message: String },
    /// The storage transaction kept failing.
    Storage { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Conversion(e) => write!(f, "{e}"),
            FailureReason::TypeCheck { message } => write!(f, "type check failed: {message}"),
            FailureReason::Storage { message } => write!(f, "storage error: {message}"),
        }
    }
}

/// One failed instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceFailure {
    pub instance: InstanceId,
    pub reason: FailureReason,
    /// Storage transactions attempted before giving up.
    pub attempts: u32,
}

/// Terminal outcome of one instance, sent from a worker to the collector.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Migrated(InstanceId),
    Failed(InstanceFailure),
    /// Bound elsewhere by the time the worker read or committed it.
    Skipped(InstanceId),
}

/// Result of one migration run between two versions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationReport {
    pub from: VersionId,
    pub to: VersionId,
    pub migrated: Vec<InstanceId>,
    pub failed: Vec<InstanceFailure>,
    /// Enumerated instances that were no longer bound to `from` when their
    /// worker reached them.
    pub skipped: Vec<InstanceId>,
    /// Instances still bound to `from` that the run never processed.
    pub remaining: usize,
    pub cancelled: bool,
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

impl MigrationReport {
    pub fn new(from: VersionId, to: VersionId) -> Self {
        Self {
            from,
            to,
            migrated: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            remaining: 0,
            cancelled: false,
            timed_out: false,
            elapsed_ms: 0,
        }
    }

    /// The report for a transition that changed nothing.
    pub fn noop(version: VersionId) -> Self {
        Self::new(version, version)
    }

    pub fn migrated_count(&self) -> usize {
        self.migrated.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Instances that reached a terminal state in this run.
    pub fn processed(&self) -> usize {
        self.migrated.len() + self.failed.len() + self.skipped.len()
    }

    /// Whether every enumerated instance reached a terminal state.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && !self.timed_out && self.remaining == 0
    }

    pub fn failure(&self, instance: InstanceId) -> Option<&InstanceFailure> {
        self.failed.iter().find(|f| f.instance == instance)
    }

    /// The final state of `instance` in this run. Instances the run did not
    /// report on are still `Queued`.
    pub fn state_of(&self, instance: InstanceId) -> InstanceState {
        if self.migrated.contains(&instance) {
            InstanceState::Migrated
        } else if self.failure(instance).is_some() {
            InstanceState::Failed
        } else {
            InstanceState::Queued
        }
    }

    pub(crate) fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Migrated(id) => self.migrated.push(id),
            Outcome::Failed(failure) => self.failed.push(failure),
            Outcome::Skipped(id) => self.skipped.push(id),
        }
    }

    /// Sorts id lists so reports compare independently of completion order.
    pub(crate) fn normalize(&mut self) {
        self.migrated.sort();
        self.skipped.sort();
        self.failed.sort_by_key(|f| f.instance);
    }
}
