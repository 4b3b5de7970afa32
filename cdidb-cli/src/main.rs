//! cdidb - vocabulary inventory data management for child-language labs
//!
//! Command-line entry point: ingest snapshot spreadsheets, search and
//! export the snapshot store, soft-delete/restore, recompute derived
//! values, and administer checklist/percentile/presentation formats.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

mod commands;

#[derive(Parser)]
#[command(name = "cdidb", version, about = "Vocabulary inventory data management")]
struct Cli {
    /// Data root folder (overrides env var and config file)
    #[arg(long, global = true)]
    data_root: Option<String>,

    /// Config file path
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and data directories
    Init,

    /// Ingest a snapshot spreadsheet (CSV, one column per session)
    Ingest {
        /// CSV file to ingest
        file: PathBuf,
    },

    /// Search snapshots
    Search {
        /// Filter triple, repeatable: field:operator:value
        #[arg(long = "filter", value_name = "FIELD:OP:VALUE")]
        filters: Vec<String>,

        /// Include soft-deleted snapshots
        #[arg(long)]
        include_deleted: bool,
    },

    /// Export snapshots as a consolidated CSV or a per-study ZIP archive
    Export {
        #[arg(long = "filter", value_name = "FIELD:OP:VALUE")]
        filters: Vec<String>,

        /// Write a ZIP with one CSV member per study
        #[arg(long)]
        archive: bool,

        /// Presentation format safe_name for sentinel translation
        #[arg(long)]
        presentation: Option<String>,

        /// Output file
        #[arg(long)]
        out: PathBuf,
    },

    /// Soft-delete (or hard-delete) snapshots matching the filters
    Delete {
        #[arg(long = "filter", value_name = "FIELD:OP:VALUE")]
        filters: Vec<String>,

        /// Remove rows permanently instead of marking them deleted
        #[arg(long)]
        hard: bool,

        /// Confirm the operation; nothing happens without it
        #[arg(long)]
        yes: bool,
    },

    /// Restore soft-deleted snapshots matching the filters
    Restore {
        #[arg(long = "filter", value_name = "FIELD:OP:VALUE")]
        filters: Vec<String>,

        /// Confirm the operation; nothing happens without it
        #[arg(long)]
        yes: bool,
    },

    /// Recompute derived values, optionally applying a participant patch
    Recalc {
        /// Snapshot ids to recompute, repeatable
        #[arg(long = "snapshot")]
        snapshots: Vec<i64>,

        /// Global child id the patch applies to
        #[arg(long)]
        child: Option<String>,

        /// New gender (m/f/o)
        #[arg(long)]
        gender: Option<String>,

        /// New birthday (YYYY/MM/DD, YYYY-MM-DD or MM/DD/YYYY)
        #[arg(long)]
        birthday: Option<String>,

        /// New hearing status (boolean)
        #[arg(long)]
        hard_of_hearing: Option<String>,

        /// New comma-separated language list
        #[arg(long)]
        languages: Option<String>,
    },

    /// Manage checklist format definitions
    Formats {
        #[command(subcommand)]
        action: FormatAction,
    },

    /// Manage percentile tables
    Tables {
        #[command(subcommand)]
        action: FormatAction,
    },

    /// Manage presentation formats
    Presentations {
        #[command(subcommand)]
        action: FormatAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum FormatAction {
    /// List stored entries
    List,
    /// Add or replace an entry from a definition file
    Add {
        /// URL-safe unique name
        #[arg(long)]
        safe_name: String,

        /// Human-readable name
        #[arg(long)]
        human_name: String,

        /// Definition file (YAML for formats/presentations, CSV for tables)
        file: PathBuf,
    },
    /// Remove an entry and its definition file
    Remove { safe_name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting cdidb v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let paths = cdidb_common::config::resolve_data_root(
        cli.data_root.as_deref(),
        cli.config.as_deref(),
    )?;
    info!("Data root: {}", paths.root.display());

    let context = commands::Context::open(&paths).await?;
    match cli.command {
        Command::Init => commands::init(&context, &paths).await,
        Command::Ingest { file } => commands::ingest(&context, &file).await,
        Command::Search { filters, include_deleted } => {
            commands::search(&context, &filters, include_deleted).await
        }
        Command::Export { filters, archive, presentation, out } => {
            commands::export(&context, &filters, archive, presentation.as_deref(), &out).await
        }
        Command::Delete { filters, hard, yes } => {
            commands::delete(&context, &filters, false, hard, yes).await
        }
        Command::Restore { filters, yes } => {
            commands::delete(&context, &filters, true, false, yes).await
        }
        Command::Recalc { snapshots, child, gender, birthday, hard_of_hearing, languages } => {
            commands::recalc(
                &context,
                &snapshots,
                child.as_deref(),
                gender.as_deref(),
                birthday.as_deref(),
                hard_of_hearing.as_deref(),
                languages.as_deref(),
            )
            .await
        }
        Command::Formats { action } => commands::manage_formats(&context, action).await,
        Command::Tables { action } => commands::manage_tables(&context, action).await,
        Command::Presentations { action } => commands::manage_presentations(&context, action).await,
    }
}
