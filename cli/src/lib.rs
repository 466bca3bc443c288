//! Commands behind the `schemaflow` binary.
//!
//! Stateless commands (`diff`, `apply`) work on JSON files. Stateful commands
//! load a [`MemoryStore`] snapshot from `--state`, run through the
//! [`SchemaService`], and save the snapshot back.

use anyhow::{Context, Result, anyhow};
use schemaflow_changes::{SchemaChange, apply, diff};
use schemaflow_migrate::{
    MigrationConfig, MigrationCoordinator, MigrationReport, NoopIndexSync, SchemaService,
};
use schemaflow_model::ContainerDefinition;
use schemaflow_storage::{ContentStore, MemoryStore};
use schemaflow_types::{ContainerId, VersionId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One line of `history` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionSummary {
    pub id: VersionId,
    pub number: u32,
    pub name: String,
    pub fields: Vec<String>,
    pub changes: Vec<String>,
    pub bound_instances: usize,
}

/// Result of `import`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub container: ContainerId,
    pub version: VersionId,
    pub instances: usize,
}

/// Reads and deserializes a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Builds the migration config from an optional JSON file plus flag overrides.
pub fn load_config(
    path: Option<&Path>,
    workers: Option<usize>,
    timeout_ms: Option<u64>,
) -> Result<MigrationConfig> {
    let mut config = match path {
        Some(path) => read_json(path)?,
        None => MigrationConfig::default(),
    };
    if let Some(workers) = workers {
        config.workers = workers;
    }
    if timeout_ms.is_some() {
        config.timeout_ms = timeout_ms;
    }
    Ok(config)
}

pub fn diff_files(old: &Path, new: &Path) -> Result<Vec<SchemaChange>> {
    let old: ContainerDefinition = read_json(old)?;
    let new: ContainerDefinition = read_json(new)?;
    diff(&old, &new).context("Failed to diff definitions")
}

pub fn apply_files(old: &Path, changes: &Path) -> Result<ContainerDefinition> {
    let old: ContainerDefinition = read_json(old)?;
    let changes: Vec<SchemaChange> = read_json(changes)?;
    apply(&old, &changes).context("Failed to apply changes")
}

/// A service over the snapshot at `state`.
struct Session {
    store: Arc<MemoryStore>,
    service: SchemaService,
}

impl Session {
    async fn open(state: &Path, config: MigrationConfig) -> Result<Self> {
        let store = Arc::new(
            MemoryStore::open(state)
                .await
                .with_context(|| format!("Failed to open state {}", state.display()))?,
        );
        let coordinator =
            MigrationCoordinator::new(store.clone(), Arc::new(NoopIndexSync), config);
        let service = SchemaService::new(store.clone(), coordinator);
        Ok(Self { store, service })
    }

    async fn save(&self, state: &Path) -> Result<()> {
        self.store
            .save(state)
            .await
            .with_context(|| format!("Failed to save state {}", state.display()))
    }

    async fn container(&self, name: &str) -> Result<ContainerId> {
        Ok(self.service.container_by_name(name).await?)
    }
}

/// Creates a container from a definition file and optionally seeds
/// instances from a JSON array of field objects.
pub async fn import(
    state: &Path,
    definition: &Path,
    instances: Option<&Path>,
    config: MigrationConfig,
) -> Result<ImportSummary> {
    let definition: ContainerDefinition = read_json(definition)?;
    let session = Session::open(state, config).await?;
    let version = session.service.create_container(definition).await?;

    let mut count = 0;
    if let Some(path) = instances {
        let rows: Vec<Map<String, Value>> = read_json(path)?;
        for (i, fields) in rows.into_iter().enumerate() {
            session
                .service
                .create_instance(version.container, fields)
                .await
                .with_context(|| format!("Instance #{i} in {} is invalid", path.display()))?;
            count += 1;
        }
    }
    session.save(state).await?;
    info!("Imported container {} with {} instances", version.container, count);

    Ok(ImportSummary {
        container: version.container,
        version: version.id,
        instances: count,
    })
}

/// Proposes a new definition for a stored container and migrates.
pub async fn migrate(
    state: &Path,
    container: &str,
    definition: &Path,
    config: MigrationConfig,
) -> Result<MigrationReport> {
    let definition: ContainerDefinition = read_json(definition)?;
    let session = Session::open(state, config).await?;
    let id = session.container(container).await?;
    let report = session
        .service
        .propose_schema_update(id, definition)
        .await
        .with_context(|| format!("Failed to update container {container}"))?;
    session.save(state).await?;
    Ok(report)
}

/// Applies an explicit change list to a stored container and migrates.
pub async fn change(
    state: &Path,
    container: &str,
    changes: &Path,
    config: MigrationConfig,
) -> Result<MigrationReport> {
    let changes: Vec<SchemaChange> = read_json(changes)?;
    let session = Session::open(state, config).await?;
    let id = session.container(container).await?;
    let report = session
        .service
        .propose_changes(id, changes)
        .await
        .with_context(|| format!("Failed to change container {container}"))?;
    session.save(state).await?;
    Ok(report)
}

/// Migrates instances left on older versions onto the head.
pub async fn pending(
    state: &Path,
    container: &str,
    config: MigrationConfig,
) -> Result<Vec<MigrationReport>> {
    let session = Session::open(state, config).await?;
    let id = session.container(container).await?;
    let reports = session.service.migrate_pending(id).await?;
    session.save(state).await?;
    Ok(reports)
}

/// Lists a container's versions with the changes that produced them.
pub async fn history(state: &Path, container: &str) -> Result<Vec<VersionSummary>> {
    if !state.exists() {
        return Err(anyhow!("State file {} does not exist", state.display()));
    }
    let session = Session::open(state, MigrationConfig::default()).await?;
    let id = session.container(container).await?;

    let mut out = Vec::new();
    for version in session.service.versions(id).await? {
        let changes = session.service.changes(version.id).await?;
        let bound_instances = session.store.count_bound(version.id).await?;
        out.push(VersionSummary {
            id: version.id,
            number: version.number,
            name: version.definition.name.clone(),
            fields: version
                .definition
                .field_names()
                .into_iter()
                .map(str::to_owned)
                .collect(),
            changes: changes.iter().map(describe).collect(),
            bound_instances,
        });
    }
    Ok(out)
}

fn describe(change: &SchemaChange) -> String {
    match change.field_name() {
        Some(field) => format!("{} {}", change.operation(), field),
        None => change.operation().to_string(),
    }
}

/// Pretty-prints any serializable value to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
