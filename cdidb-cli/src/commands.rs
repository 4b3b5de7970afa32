//! Command handlers

use crate::FormatAction;
use anyhow::{bail, Context as _, Result};
use cdidb_common::config::DataPaths;
use cdidb_common::constants::SNAPSHOTS_TABLE;
use cdidb_common::db::init_database;
use cdidb_export::{export_archive, export_consolidated};
use cdidb_formats::{FormatRegistry, PresentationFormat};
use cdidb_ingest::values::{parse_boolean, parse_gender};
use cdidb_query::{
    run_delete_query, run_search_query, Filter, ParticipantPatch,
};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Everything a command needs: the pool and the format registry
pub struct Context {
    pub pool: SqlitePool,
    pub registry: FormatRegistry,
}

impl Context {
    pub async fn open(paths: &DataPaths) -> Result<Self> {
        paths.ensure_dirs()?;
        let pool = init_database(&paths.database_file).await?;
        let registry = FormatRegistry::new(pool.clone(), paths);
        Ok(Self { pool, registry })
    }
}

/// Parse repeatable `field:operator:value` arguments
fn parse_filters(raw: &[String]) -> Result<Vec<Filter>> {
    raw.iter()
        .map(|triple| {
            let mut parts = triple.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(field), Some(op), Some(value)) => Ok(Filter::new(field, op, value)),
                _ => bail!("filter must be field:operator:value, got '{}'", triple),
            }
        })
        .collect()
}

async fn load_presentation(
    context: &Context,
    safe_name: Option<&str>,
) -> Result<Option<Arc<PresentationFormat>>> {
    match safe_name {
        Some(name) => {
            let presentation = context
                .registry
                .load_presentation_format(name)
                .await?
                .with_context(|| format!("presentation format '{}' not found", name))?;
            Ok(Some(presentation))
        }
        None => Ok(None),
    }
}

pub async fn init(_context: &Context, paths: &DataPaths) -> Result<()> {
    // Context::open already created the schema and directories
    println!("Initialized data root at {}", paths.root.display());
    Ok(())
}

pub async fn ingest(context: &Context, file: &Path) -> Result<()> {
    let sheet = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let outcome = cdidb_ingest::run_ingest(&context.pool, &context.registry, &sheet).await?;
    println!(
        "Ingested {} snapshot(s) (batch {})",
        outcome.snapshot_ids.len(),
        outcome.batch_id
    );
    Ok(())
}

pub async fn search(context: &Context, raw_filters: &[String], include_deleted: bool) -> Result<()> {
    let filters = parse_filters(raw_filters)?;
    let results =
        run_search_query(&context.pool, &filters, SNAPSHOTS_TABLE, !include_deleted).await?;

    for snapshot in &results {
        println!("{}", serde_json::to_string(snapshot)?);
    }
    info!("{} snapshot(s) matched", results.len());
    Ok(())
}

pub async fn export(
    context: &Context,
    raw_filters: &[String],
    archive: bool,
    presentation_name: Option<&str>,
    out: &Path,
) -> Result<()> {
    let filters = parse_filters(raw_filters)?;
    let snapshots = run_search_query(&context.pool, &filters, SNAPSHOTS_TABLE, true).await?;
    if snapshots.is_empty() {
        bail!("no snapshots matched the filters");
    }
    let count = snapshots.len();
    let presentation = load_presentation(context, presentation_name).await?;

    if archive {
        let bytes = export_archive(
            &context.pool,
            &context.registry,
            snapshots,
            presentation.as_deref(),
        )
        .await?;
        std::fs::write(out, bytes)?;
    } else {
        let csv_text = export_consolidated(
            &context.pool,
            &context.registry,
            snapshots,
            presentation.as_deref(),
        )
        .await?;
        std::fs::write(out, csv_text)?;
    }

    println!("Exported {} snapshot(s) to {}", count, out.display());
    Ok(())
}

pub async fn delete(
    context: &Context,
    raw_filters: &[String],
    restore: bool,
    hard: bool,
    confirmed: bool,
) -> Result<()> {
    let filters = parse_filters(raw_filters)?;
    if filters.is_empty() {
        bail!("refusing to run a delete/restore with no filters");
    }

    let affected = run_delete_query(
        &context.pool,
        &filters,
        SNAPSHOTS_TABLE,
        restore,
        hard,
        confirmed,
    )
    .await?;

    let action = if restore {
        "Restored"
    } else if hard {
        "Hard-deleted"
    } else {
        "Soft-deleted"
    };
    println!("{} {} snapshot(s)", action, affected.len());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn recalc(
    context: &Context,
    snapshots: &[i64],
    child: Option<&str>,
    gender: Option<&str>,
    birthday: Option<&str>,
    hard_of_hearing: Option<&str>,
    languages: Option<&str>,
) -> Result<()> {
    if snapshots.is_empty() {
        bail!("at least one --snapshot id is required");
    }

    let patch = ParticipantPatch {
        gender: gender.map(parse_gender).transpose().map_err(anyhow::Error::msg)?,
        birthday: birthday.map(str::to_string),
        hard_of_hearing: hard_of_hearing
            .map(parse_boolean)
            .transpose()
            .map_err(anyhow::Error::msg)?,
        languages: languages.map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }),
    };

    let has_patch = patch.gender.is_some()
        || patch.birthday.is_some()
        || patch.hard_of_hearing.is_some()
        || patch.languages.is_some();

    let updated = match (child, has_patch) {
        (Some(child_id), _) => {
            cdidb_query::update_participant_metadata(
                &context.pool,
                &context.registry,
                child_id,
                &patch,
                snapshots,
            )
            .await?
        }
        (None, true) => bail!("--child is required when patching participant metadata"),
        (None, false) => {
            cdidb_query::recalculate_snapshots(&context.pool, &context.registry, snapshots).await?
        }
    };

    println!("Recalculated {} snapshot(s)", updated);
    Ok(())
}

pub async fn manage_formats(context: &Context, action: FormatAction) -> Result<()> {
    match action {
        FormatAction::List => {
            for row in context.registry.list_cdi_formats().await? {
                println!("{}\t{}\t{}", row.safe_name, row.human_name, row.filename);
            }
        }
        FormatAction::Add { safe_name, human_name, file } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let filename = definition_filename(&file, &safe_name);
            context
                .registry
                .save_cdi_format(&safe_name, &human_name, &filename, &body)
                .await?;
            println!("Saved checklist format '{}'", safe_name);
        }
        FormatAction::Remove { safe_name } => {
            context.registry.delete_cdi_format(&safe_name).await?;
            println!("Removed checklist format '{}'", safe_name);
        }
    }
    Ok(())
}

pub async fn manage_tables(context: &Context, action: FormatAction) -> Result<()> {
    match action {
        FormatAction::List => {
            for row in context.registry.list_percentile_tables().await? {
                println!("{}\t{}\t{}", row.safe_name, row.human_name, row.filename);
            }
        }
        FormatAction::Add { safe_name, human_name, file } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let filename = definition_filename(&file, &safe_name);
            context
                .registry
                .save_percentile_table(&safe_name, &human_name, &filename, &body)
                .await?;
            println!("Saved percentile table '{}'", safe_name);
        }
        FormatAction::Remove { safe_name } => {
            context.registry.delete_percentile_table(&safe_name).await?;
            println!("Removed percentile table '{}'", safe_name);
        }
    }
    Ok(())
}

pub async fn manage_presentations(context: &Context, action: FormatAction) -> Result<()> {
    match action {
        FormatAction::List => {
            for row in context.registry.list_presentation_formats().await? {
                println!("{}\t{}\t{}", row.safe_name, row.human_name, row.filename);
            }
        }
        FormatAction::Add { safe_name, human_name, file } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let filename = definition_filename(&file, &safe_name);
            context
                .registry
                .save_presentation_format(&safe_name, &human_name, &filename, &body)
                .await?;
            println!("Saved presentation format '{}'", safe_name);
        }
        FormatAction::Remove { safe_name } => {
            context.registry.delete_presentation_format(&safe_name).await?;
            println!("Removed presentation format '{}'", safe_name);
        }
    }
    Ok(())
}

/// Stored body filename: keep the source file's name, fall back to the
/// safe_name when it is unusable
fn definition_filename(file: &Path, safe_name: &str) -> String {
    file.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("{}.def", safe_name))
}
