//! Metadata recalculation
//!
//! After a participant's metadata changes (gender, birthday, languages,
//! hearing status), the derived values on each affected snapshot are
//! re-derived from its stored word contents and written back one snapshot
//! at a time. A failure on one snapshot is logged and skipped; the rest of
//! the batch proceeds.

use cdidb_common::constants::DEFAULT_CDI_TYPE;
use cdidb_common::dates::{months_between, normalize_date, parse_date};
use cdidb_common::db::snapshots::{load_contents, load_snapshot, update_snapshot_metadata};
use cdidb_common::{Error, Result};
use cdidb_formats::{ChecklistFormat, FormatRegistry};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

/// Fields a participant-level metadata edit may change
#[derive(Debug, Clone, Default)]
pub struct ParticipantPatch {
    pub gender: Option<i64>,
    /// Any accepted date format; normalized before storage
    pub birthday: Option<String>,
    pub hard_of_hearing: Option<i64>,
    pub languages: Option<Vec<String>>,
}

/// Apply a metadata patch to the named snapshots of one global child id,
/// then recompute each snapshot's derived values.
///
/// Snapshots that do not belong to the child are skipped with a warning.
pub async fn update_participant_metadata(
    pool: &SqlitePool,
    registry: &FormatRegistry,
    child_id: &str,
    patch: &ParticipantPatch,
    snapshot_ids: &[i64],
) -> Result<usize> {
    let birthday = match &patch.birthday {
        Some(raw) => Some(normalize_date(raw)?),
        None => None,
    };

    let mut updated = 0;
    for &snapshot_id in snapshot_ids {
        let Some(mut snapshot) = load_snapshot(pool, snapshot_id).await? else {
            warn!("snapshot {} not found, skipping", snapshot_id);
            continue;
        };
        if snapshot.child_id.as_deref() != Some(child_id) {
            warn!(
                "snapshot {} does not belong to child {}, skipping",
                snapshot_id, child_id
            );
            continue;
        }

        if let Some(gender) = patch.gender {
            snapshot.gender = gender;
        }
        if let Some(birthday) = &birthday {
            snapshot.birthday = birthday.clone();
        }
        if let Some(hard_of_hearing) = patch.hard_of_hearing {
            snapshot.hard_of_hearing = hard_of_hearing;
        }
        if let Some(languages) = &patch.languages {
            snapshot.languages = languages.clone();
            snapshot.num_languages = languages.len() as i64;
        }

        update_snapshot_metadata(pool, &snapshot).await?;
        match recalculate_snapshot(pool, registry, snapshot_id).await {
            Ok(()) => updated += 1,
            Err(error) => warn!("recalculation of snapshot {} failed: {}", snapshot_id, error),
        }
    }

    info!(
        "participant {} metadata updated across {} snapshot(s)",
        child_id, updated
    );
    Ok(updated)
}

/// Recompute derived values for a set of snapshots.
///
/// Returns the number of snapshots successfully recalculated; per-snapshot
/// failures are logged and skipped.
pub async fn recalculate_snapshots(
    pool: &SqlitePool,
    registry: &FormatRegistry,
    snapshot_ids: &[i64],
) -> Result<usize> {
    let mut updated = 0;
    for &snapshot_id in snapshot_ids {
        match recalculate_snapshot(pool, registry, snapshot_id).await {
            Ok(()) => updated += 1,
            Err(error) => warn!("recalculation of snapshot {} failed: {}", snapshot_id, error),
        }
    }
    Ok(updated)
}

/// Re-derive words_spoken, age and percentile for one stored snapshot and
/// persist the updated row.
pub async fn recalculate_snapshot(
    pool: &SqlitePool,
    registry: &FormatRegistry,
    snapshot_id: i64,
) -> Result<()> {
    let mut snapshot = load_snapshot(pool, snapshot_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("snapshot {}", snapshot_id)))?;
    let contents = load_contents(pool, snapshot_id).await?;

    let format = resolve_format(registry, &snapshot.cdi_type).await?;
    let spoken_codes = format.count_as_spoken();
    snapshot.words_spoken = contents
        .iter()
        .filter(|entry| spoken_codes.contains(&entry.value))
        .count() as i64;

    let birthday = parse_date(&snapshot.birthday)?;
    let session_date = parse_date(&snapshot.session_date)?;
    snapshot.age = months_between(birthday, session_date);

    let table = registry.percentile_table_for(&format, snapshot.gender).await?;
    snapshot.percentile =
        table.find_percentile(snapshot.words_spoken, snapshot.age, format.max_words());

    update_snapshot_metadata(pool, &snapshot).await?;
    Ok(())
}

/// Resolve a snapshot's format, falling back to the default checklist when
/// the stored cdi_type no longer exists.
async fn resolve_format(
    registry: &FormatRegistry,
    cdi_type: &str,
) -> Result<Arc<ChecklistFormat>> {
    if let Some(format) = registry.load_cdi_format(cdi_type).await? {
        return Ok(format);
    }
    warn!(
        "checklist format '{}' not found, falling back to '{}'",
        cdi_type, DEFAULT_CDI_TYPE
    );
    registry
        .load_cdi_format(DEFAULT_CDI_TYPE)
        .await?
        .ok_or_else(|| Error::NotFound(format!("checklist format '{}'", DEFAULT_CDI_TYPE)))
}
