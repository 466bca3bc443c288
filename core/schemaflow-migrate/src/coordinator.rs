//! Migration coordinator.
//!
//! Moves every instance bound to a source version onto a target version by
//! replaying the transition's structural changes on the stored field data.
//!
//! # Pipeline
//!
//! ```text
//! enumerate (paged) ──► bounded queue ──► N workers ──► results ──► report
//! ```
//!
//! Each worker runs one read-modify-write transaction per instance. An
//! instance that fails conversion or type checking stays on the source
//! version and is reported; the others carry on. Nothing is rolled back.
//! Cancelling stops the queue: in-flight instances finish, the rest stay
//! bound to the source version and a later run picks them up.

use crate::config::MigrationConfig;
use crate::conversion::convert;
use crate::error::{FieldConversionError, MigrateResult, MigrationError};
use crate::index::{IndexSync, MappingDelta};
use crate::report::{FailureReason, InstanceFailure, InstanceState, MigrationReport, Outcome};
use schemaflow_changes::{SchemaChange, apply_change};
use schemaflow_model::{ContainerDefinition, FieldSchema};
use schemaflow_storage::{
    ContainerVersion, ContentStore, InstanceUpdate, Page, StorageError, StorageResult,
};
use schemaflow_types::{InstanceId, VersionId};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Cooperative cancellation for a running migration.
///
/// Clones share the same flag.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Stops handing out queued instances. In-flight instances complete.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A value-level edit derived from one structural change.
#[derive(Debug, Clone)]
enum Step {
    /// ADDFIELD: the new field starts absent.
    Clear(String),
    /// REMOVEFIELD: the stored value is dropped.
    Drop(String),
    /// CHANGEFIELDTYPE: the stored value is converted.
    Convert { from: FieldSchema, to: FieldSchema },
    /// RENAMEFIELD: the stored value moves.
    Rename { from: String, to: String },
}

/// The change chain compiled against the source definition.
#[derive(Debug)]
struct Plan {
    steps: Vec<Step>,
    mappings: Vec<MappingDelta>,
    target: ContainerDefinition,
}

impl Plan {
    fn compile(
        from: &ContainerVersion,
        to: &ContainerVersion,
        changes: &[SchemaChange],
    ) -> MigrateResult<Self> {
        let mut def = from.definition.clone();
        let mut steps = Vec::new();
        let mut mappings = Vec::new();

        for (index, change) in changes.iter().enumerate() {
            if let Some(delta) = MappingDelta::for_change(&def, change) {
                mappings.push(delta);
            }
            let before = change.field_name().and_then(|name| def.field(name)).cloned();
            apply_change(&mut def, index, change)?;

            match change {
                SchemaChange::AddField { field } => steps.push(Step::Clear(field.name.clone())),
                SchemaChange::RemoveField { field } => steps.push(Step::Drop(field.clone())),
                SchemaChange::ChangeFieldType { field, .. } => {
                    if let (Some(before), Some(after)) = (before, def.field(field)) {
                        steps.push(Step::Convert {
                            from: before,
                            to: after.clone(),
                        });
                    }
                }
                SchemaChange::RenameField { field, new_name } => steps.push(Step::Rename {
                    from: field.clone(),
                    to: new_name.clone(),
                }),
                SchemaChange::UpdateField { .. } | SchemaChange::UpdateSchema(_) => {}
            }
        }

        if def != to.definition {
            return Err(MigrationError::ChainMismatch {
                from: from.id,
                to: to.id,
            });
        }
        Ok(Self {
            steps,
            mappings,
            target: def,
        })
    }

    /// Replays the steps on one instance's field data.
    fn transform(&self, fields: &Map<String, Value>) -> Result<Map<String, Value>, FieldConversionError> {
        let mut out = fields.clone();
        for step in &self.steps {
            match step {
                Step::Clear(name) | Step::Drop(name) => {
                    out.remove(name);
                }
                Step::Convert { from, to } => {
                    if let Some(value) = out.get(&to.name) {
                        let converted = convert(value, from, to)?;
                        out.insert(to.name.clone(), converted);
                    }
                }
                Step::Rename { from, to } => {
                    if let Some(value) = out.remove(from) {
                        out.insert(to.clone(), value);
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Runs migrations against a content store with a bounded worker pool.
#[derive(Clone)]
pub struct MigrationCoordinator {
    store: Arc<dyn ContentStore>,
    index: Arc<dyn IndexSync>,
    config: MigrationConfig,
}

impl MigrationCoordinator {
    pub fn new(
        store: Arc<dyn ContentStore>,
        index: Arc<dyn IndexSync>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            store,
            index,
            config,
        }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Migrates every instance bound to `from` onto `to`, replaying `changes`.
    pub async fn migrate(
        &self,
        from: &ContainerVersion,
        to: &ContainerVersion,
        changes: &[SchemaChange],
    ) -> MigrateResult<MigrationReport> {
        self.migrate_with_cancel(from, to, changes, &CancelHandle::new())
            .await
    }

    /// Like [`MigrationCoordinator::migrate`], stopping early once `cancel`
    /// fires. Hitting the configured timeout fires `cancel` too.
    pub async fn migrate_with_cancel(
        &self,
        from: &ContainerVersion,
        to: &ContainerVersion,
        changes: &[SchemaChange],
        cancel: &CancelHandle,
    ) -> MigrateResult<MigrationReport> {
        let started = Instant::now();
        if from.container != to.container {
            return Err(MigrationError::ContainerMismatch {
                from: from.id,
                to: to.id,
            });
        }
        let plan = Arc::new(Plan::compile(from, to, changes)?);

        info!(
            "Migrating container {} from version {} to {} ({} changes, {} value steps)",
            from.container,
            from.number,
            to.number,
            changes.len(),
            plan.steps.len()
        );

        self.sync_mappings(to, &plan.mappings).await;

        let (queue_tx, queue_rx) = mpsc::channel(self.config.queue_bound());
        let (result_tx, mut result_rx) = mpsc::channel(self.config.queue_bound());
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        let producer = tokio::spawn(enumerate(
            self.store.clone(),
            from.id,
            self.config.clone(),
            queue_tx,
            cancel.subscribe(),
        ));

        let mut workers = JoinSet::new();
        for worker in 0..self.config.worker_count() {
            let worker = Worker {
                id: worker,
                store: self.store.clone(),
                index: self.index.clone(),
                plan: plan.clone(),
                from: from.id,
                to: to.id,
                config: self.config.clone(),
            };
            workers.spawn(worker.run(queue_rx.clone(), result_tx.clone(), cancel.subscribe()));
        }
        drop(queue_rx);
        drop(result_tx);

        let mut report = MigrationReport::new(from.id, to.id);
        let deadline = self
            .config
            .timeout()
            .map(|t| tokio::time::Instant::now() + t);
        loop {
            let next = match deadline {
                Some(deadline) if !report.timed_out => {
                    tokio::select! {
                        outcome = result_rx.recv() => outcome,
                        _ = tokio::time::sleep_until(deadline) => {
                            warn!(
                                "Migration of container {} timed out, draining in-flight instances",
                                from.container
                            );
                            report.timed_out = true;
                            cancel.cancel();
                            continue;
                        }
                    }
                }
                _ => result_rx.recv().await,
            };
            match next {
                Some(outcome) => report.record(outcome),
                None => break,
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("Migration worker failed: {}", e);
            }
        }
        match producer.await {
            Ok(Ok(enumerated)) => debug!(enumerated, "Enumeration finished"),
            Ok(Err(e)) => warn!("Enumeration of version {} stopped: {}", from.id, e),
            Err(e) => warn!("Enumeration task failed: {}", e),
        }
        report.cancelled = cancel.is_cancelled() && !report.timed_out;
        report.remaining = match self.store.count_bound(from.id).await {
            Ok(bound) => bound.saturating_sub(report.failed_count()),
            Err(e) => {
                warn!("Could not count instances left on version {}: {}", from.id, e);
                0
            }
        };
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report.normalize();

        if report.failed.is_empty() {
            info!(
                "Migration to version {} finished: {} migrated, {} skipped, {} remaining",
                to.number,
                report.migrated_count(),
                report.skipped_count(),
                report.remaining
            );
        } else {
            warn!(
                "Migration to version {} finished: {} migrated, {} failed, {} skipped, {} remaining",
                to.number,
                report.migrated_count(),
                report.failed_count(),
                report.skipped_count(),
                report.remaining
            );
        }
        Ok(report)
    }

    /// Sends one mapping update per (structural change, index) pair. Failures
    /// are logged and ignored.
    async fn sync_mappings(&self, to: &ContainerVersion, mappings: &[MappingDelta]) {
        if mappings.is_empty() {
            return;
        }
        let indices = self.index.indices(to);
        for delta in mappings {
            for index in &indices {
                match self.index.update_mapping(index, delta).await {
                    Ok(()) => debug!(index = %index, "Updated index mapping"),
                    Err(e) => warn!("Mapping update for index {} failed: {}", index, e),
                }
            }
        }
        info!(
            "Sent {} mapping updates to {} indices",
            mappings.len(),
            indices.len()
        );
    }
}

/// Pages through the instances bound to `version` and feeds the queue.
/// Returns how many ids were enqueued.
async fn enumerate(
    store: Arc<dyn ContentStore>,
    version: VersionId,
    config: MigrationConfig,
    queue: mpsc::Sender<InstanceId>,
    mut cancel: watch::Receiver<bool>,
) -> StorageResult<usize> {
    let mut page = Page::first(config.page_limit());
    let mut enqueued = 0;
    loop {
        if *cancel.borrow() {
            return Ok(enqueued);
        }
        let batch = read_page(store.as_ref(), version, page, &config).await?;
        let Some(last) = batch.last().copied() else {
            return Ok(enqueued);
        };
        page.after = Some(last);

        for id in batch {
            tokio::select! {
                sent = queue.send(id) => {
                    if sent.is_err() {
                        return Ok(enqueued);
                    }
                }
                _ = cancelled(&mut cancel) => return Ok(enqueued),
            }
            debug!(instance = %id, state = %InstanceState::Queued, "Instance queued");
            enqueued += 1;
        }
    }
}

/// Resolves once the flag is set. Never resolves if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn read_page(
    store: &dyn ContentStore,
    version: VersionId,
    page: Page,
    config: &MigrationConfig,
) -> StorageResult<Vec<InstanceId>> {
    let mut attempt = 1;
    loop {
        match store.bound_instances(version, page).await {
            Err(e) if e.is_retryable() && attempt < config.attempts() => {
                warn!("Reading instances of version {} failed, retrying: {}", version, e);
                tokio::time::sleep(config.backoff(attempt)).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// One member of the worker pool.
struct Worker {
    id: usize,
    store: Arc<dyn ContentStore>,
    index: Arc<dyn IndexSync>,
    plan: Arc<Plan>,
    from: VersionId,
    to: VersionId,
    config: MigrationConfig,
}

impl Worker {
    async fn run(
        self,
        queue: Arc<Mutex<mpsc::Receiver<InstanceId>>>,
        results: mpsc::Sender<Outcome>,
        cancel: watch::Receiver<bool>,
    ) {
        loop {
            if *cancel.borrow() {
                break;
            }
            let next = queue.lock().await.recv().await;
            let Some(id) = next else {
                break;
            };
            if *cancel.borrow() {
                break;
            }

            debug!(worker = self.id, instance = %id, state = %InstanceState::InProgress, "Instance picked up");
            let outcome = self.migrate_instance(id).await;
            if results.send(outcome).await.is_err() {
                break;
            }
        }
    }

    async fn migrate_instance(&self, id: InstanceId) -> Outcome {
        let mut attempt = 1;
        loop {
            match self.try_migrate(id, attempt).await {
                Ok(outcome) => return outcome,
                Err(StorageError::BindingChanged { .. }) => return Outcome::Skipped(id),
                Err(e) if e.is_retryable() && attempt < self.config.attempts() => {
                    warn!(
                        "Attempt {} for instance {} failed, retrying: {}",
                        attempt, id, e
                    );
                    tokio::time::sleep(self.config.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Instance {} failed after {} attempts: {}", id, attempt, e);
                    return Outcome::Failed(InstanceFailure {
                        instance: id,
                        reason: FailureReason::Storage {
                            message: e.to_string(),
                        },
                        attempts: attempt,
                    });
                }
            }
        }
    }

    /// One read-modify-write transaction for a single instance.
    async fn try_migrate(&self, id: InstanceId, attempt: u32) -> StorageResult<Outcome> {
        let instance = self.store.load_instance(id).await?;
        if instance.version != self.from {
            debug!(instance = %id, "Instance no longer bound to the source version");
            return Ok(Outcome::Skipped(id));
        }

        let fields = match self.plan.transform(&instance.fields) {
            Ok(fields) => fields,
            Err(e) => {
                warn!("Instance {} {}: {}", id, InstanceState::Failed, e);
                return Ok(self.failed(id, FailureReason::Conversion(e), attempt));
            }
        };
        if let Err(e) = self.plan.target.type_check(&fields) {
            warn!("Instance {} {}: {}", id, InstanceState::Failed, e);
            let reason = FailureReason::TypeCheck {
                message: e.to_string(),
            };
            return Ok(self.failed(id, reason, attempt));
        }

        self.store
            .commit_instance(InstanceUpdate {
                instance: id,
                expected_version: self.from,
                version: self.to,
                fields,
            })
            .await?;
        debug!(instance = %id, state = %InstanceState::Migrated, "Instance migrated");

        if let Err(e) = self.index.reindex(id).await {
            warn!("Reindex of instance {} failed: {}", id, e);
        }
        Ok(Outcome::Migrated(id))
    }

    fn failed(&self, id: InstanceId, reason: FailureReason, attempts: u32) -> Outcome {
        Outcome::Failed(InstanceFailure {
            instance: id,
            reason,
            attempts,
        })
    }
}
