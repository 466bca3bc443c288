//! schemaflow: schema versioning and content migration from the command line.
//!
//! Usage:
//!   schemaflow diff old.json new.json
//!   schemaflow apply old.json changes.json
//!   schemaflow import --state state.json page.json --instances pages.json
//!   schemaflow migrate --state state.json --container page page-v2.json
//!   schemaflow change --state state.json --container page rename.json
//!   schemaflow pending --state state.json --container page
//!   schemaflow history --state state.json --container page
//!
//! Results go to stdout as JSON, logs go to stderr.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "schemaflow")]
#[command(about = "Schema versioning and content migration")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Migration config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Number of migration workers
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the changes between two definitions
    Diff { old: PathBuf, new: PathBuf },

    /// Apply a change list to a definition
    Apply { old: PathBuf, changes: PathBuf },

    /// Create a container, optionally seeding instances
    Import {
        #[arg(long)]
        state: PathBuf,
        definition: PathBuf,
        /// JSON array of instance field objects
        #[arg(long)]
        instances: Option<PathBuf>,
    },

    /// Propose a new definition for a container and migrate its content
    Migrate {
        #[arg(long)]
        state: PathBuf,
        #[arg(short, long)]
        container: String,
        definition: PathBuf,
        /// Give up on the remaining queue after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Apply an explicit change list to a container and migrate its content
    Change {
        #[arg(long)]
        state: PathBuf,
        #[arg(short, long)]
        container: String,
        changes: PathBuf,
    },

    /// Migrate instances left on older versions onto the head
    Pending {
        #[arg(long)]
        state: PathBuf,
        #[arg(short, long)]
        container: String,
    },

    /// List a container's versions
    History {
        #[arg(long)]
        state: PathBuf,
        #[arg(short, long)]
        container: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = |timeout_ms| {
        schemaflow_cli::load_config(args.config.as_deref(), args.workers, timeout_ms)
    };

    match &args.command {
        Command::Diff { old, new } => {
            let changes = schemaflow_cli::diff_files(old, new)?;
            info!("{} changes", changes.len());
            schemaflow_cli::print_json(&changes)
        }
        Command::Apply { old, changes } => {
            let definition = schemaflow_cli::apply_files(old, changes)?;
            schemaflow_cli::print_json(&definition)
        }
        Command::Import {
            state,
            definition,
            instances,
        } => {
            let summary =
                schemaflow_cli::import(state, definition, instances.as_deref(), config(None)?)
                    .await?;
            schemaflow_cli::print_json(&summary)
        }
        Command::Migrate {
            state,
            container,
            definition,
            timeout_ms,
        } => {
            let report =
                schemaflow_cli::migrate(state, container, definition, config(*timeout_ms)?)
                    .await?;
            schemaflow_cli::print_json(&report)
        }
        Command::Change {
            state,
            container,
            changes,
        } => {
            let report =
                schemaflow_cli::change(state, container, changes, config(None)?).await?;
            schemaflow_cli::print_json(&report)
        }
        Command::Pending { state, container } => {
            let reports = schemaflow_cli::pending(state, container, config(None)?).await?;
            schemaflow_cli::print_json(&reports)
        }
        Command::History { state, container } => {
            let history = schemaflow_cli::history(state, container).await?;
            schemaflow_cli::print_json(&history)
        }
    }
}
