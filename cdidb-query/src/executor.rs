//! Query executor
//!
//! Runs compiled filter queries against the snapshots table: searches with
//! an implicit live-rows clause, and the soft-delete / restore / hard-delete
//! path behind an explicit confirmation gate.

use crate::filters::{compile, CompiledQuery, Filter, StatementKind};
use crate::interpret::SqlValue;
use cdidb_common::db::models::SnapshotMetadata;
use cdidb_common::{Error, Result};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Arguments, SqlitePool};
use tracing::{debug, info};

/// Interpret every surviving filter's operand, flattened in filter order
fn interpret_operands(compiled: &CompiledQuery) -> Result<Vec<SqlValue>> {
    let mut values = Vec::new();
    for (spec, operand) in &compiled.filters {
        values.extend(spec.interpreter.interpret(operand)?);
    }
    Ok(values)
}

fn push_value(arguments: &mut SqliteArguments<'_>, value: SqlValue) -> Result<()> {
    let result = match value {
        SqlValue::Int(v) => arguments.add(v),
        SqlValue::Float(v) => arguments.add(v),
        SqlValue::Text(v) => arguments.add(v),
    };
    result.map_err(|e| Error::Internal(format!("failed to bind operand: {}", e)))
}

/// Search snapshots matching every filter.
///
/// With `exclude_deleted`, an implicit `deleted == false` clause is
/// appended, so soft-deleted rows stay invisible to default queries.
pub async fn run_search_query(
    pool: &SqlitePool,
    filters: &[Filter],
    table: &str,
    exclude_deleted: bool,
) -> Result<Vec<SnapshotMetadata>> {
    let mut all_filters = filters.to_vec();
    if exclude_deleted {
        all_filters.push(Filter::new("deleted", "eq", "0"));
    }

    let compiled = compile(&all_filters, table, StatementKind::Select);
    let values = interpret_operands(&compiled)?;
    debug!("search: {} ({} operands)", compiled.sql, values.len());

    let mut arguments = SqliteArguments::default();
    for value in values {
        push_value(&mut arguments, value)?;
    }

    let rows = sqlx::query_with(&compiled.sql, arguments)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(SnapshotMetadata::from_row).collect())
}

/// Soft-delete, restore or hard-delete snapshots matching every filter.
///
/// The caller must have gathered explicit confirmation first; executing
/// without it is a precondition failure. The affected rows are selected
/// before mutation and returned for auditing.
pub async fn run_delete_query(
    pool: &SqlitePool,
    filters: &[Filter],
    table: &str,
    restore: bool,
    hard: bool,
    confirmed: bool,
) -> Result<Vec<SnapshotMetadata>> {
    if !confirmed {
        return Err(Error::Precondition(
            "delete/restore requires explicit confirmation".to_string(),
        ));
    }

    // Capture the affected records first; deleted rows are visible here so
    // restore can find its targets
    let affected = run_search_query(pool, filters, table, false).await?;

    let kind = if hard {
        StatementKind::HardDelete
    } else {
        StatementKind::SetDeleted
    };
    let compiled = compile(filters, table, kind);
    let values = interpret_operands(&compiled)?;

    let mut arguments = SqliteArguments::default();
    if !hard {
        // The SET value binds ahead of the where-clause operands
        let deleted_value: i64 = if restore { 0 } else { 1 };
        push_value(&mut arguments, SqlValue::Int(deleted_value))?;
    }
    for value in values {
        push_value(&mut arguments, value)?;
    }

    let result = sqlx::query_with(&compiled.sql, arguments)
        .execute(pool)
        .await?;

    let action = if hard {
        "hard-deleted"
    } else if restore {
        "restored"
    } else {
        "soft-deleted"
    };
    info!("{} {} snapshot(s)", action, result.rows_affected());

    Ok(affected)
}
