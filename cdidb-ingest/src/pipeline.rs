//! Ingest pipeline
//!
//! parse -> reconcile -> persist. The whole batch is one transaction: any
//! error before commit aborts every write.

use crate::automaton::Automaton;
use crate::reconcile::reconcile_record;
use cdidb_common::db::snapshots::{insert_snapshot, next_child_id};
use cdidb_common::Result;
use cdidb_formats::FormatRegistry;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

/// Result of a committed ingest batch
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub batch_id: Uuid,
    pub snapshot_ids: Vec<i64>,
}

/// Ingest one spreadsheet of snapshot columns.
pub async fn run_ingest(
    pool: &SqlitePool,
    registry: &FormatRegistry,
    sheet: &str,
) -> Result<IngestOutcome> {
    let batch_id = Uuid::new_v4();
    debug!("ingest batch {} starting", batch_id);

    // Prefetched so the automaton stays synchronous
    let formats = registry.all_cdi_formats().await?;
    let records = Automaton::parse(sheet, &formats)?;

    // Warm the percentile cache before the batch transaction so
    // reconciliation never has to acquire a second connection mid-batch
    for row in registry.list_percentile_tables().await? {
        registry.load_percentile_table(&row.safe_name).await?;
    }

    let mut tx = pool.begin().await?;
    let mut snapshot_ids = Vec::with_capacity(records.len());
    for record in &records {
        let mut reconciled = reconcile_record(&mut tx, registry, record).await?;

        if reconciled.metadata.child_id.is_none() {
            reconciled.metadata.child_id =
                resolve_child_id(&mut tx, reconciled.source_database_id).await?;
        }

        let id = insert_snapshot(&mut tx, &reconciled.metadata, &reconciled.contents).await?;
        snapshot_ids.push(id);
    }
    tx.commit().await?;

    info!(
        "ingest batch {} committed: {} snapshot(s)",
        batch_id,
        snapshot_ids.len()
    );
    Ok(IngestOutcome {
        batch_id,
        snapshot_ids,
    })
}

/// Assign a child id for a record that did not carry one.
///
/// A supplied `database id` re-references an existing participant: the new
/// snapshot joins that snapshot's child. Otherwise the next free global id
/// is allocated.
async fn resolve_child_id(
    conn: &mut SqliteConnection,
    source_database_id: Option<i64>,
) -> Result<Option<String>> {
    if let Some(database_id) = source_database_id {
        let existing: Option<Option<String>> =
            sqlx::query("SELECT child_id FROM snapshots WHERE database_id = ?")
                .bind(database_id)
                .fetch_optional(&mut *conn)
                .await?
                .map(|row| row.get("child_id"));
        if let Some(Some(child_id)) = existing {
            return Ok(Some(child_id));
        }
    }

    Ok(Some(next_child_id(conn).await?))
}
