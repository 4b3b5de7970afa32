//! Database initialization
//!
//! Creates the cdidb schema on first run and is safe to call repeatedly;
//! every statement is idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_connection(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Open an in-memory database with the full schema. Test support.
///
/// An in-memory database exists per connection, so the pool is capped at a
/// single connection to keep every caller on the same database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    configure_connection(&pool).await?;
    create_schema(&pool).await?;
    Ok(pool)
}

async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    Ok(())
}

/// Create all cdidb tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_snapshots_table(pool).await?;
    create_snapshot_content_table(pool).await?;
    create_format_metadata_tables(pool).await?;
    Ok(())
}

/// Create the snapshots table
///
/// One row per completed checklist session. `languages` is a comma-joined
/// string; dates are canonical `YYYY/MM/DD` text.
pub async fn create_snapshots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            database_id INTEGER PRIMARY KEY AUTOINCREMENT,
            child_id TEXT,
            study_id TEXT NOT NULL,
            study TEXT NOT NULL,
            gender INTEGER NOT NULL,
            age REAL NOT NULL,
            birthday TEXT NOT NULL,
            session_date TEXT NOT NULL,
            session_num INTEGER NOT NULL,
            total_num_sessions INTEGER NOT NULL,
            words_spoken INTEGER NOT NULL,
            items_excluded INTEGER NOT NULL DEFAULT 0,
            percentile REAL NOT NULL,
            extra_categories INTEGER NOT NULL DEFAULT 0,
            revision INTEGER NOT NULL DEFAULT 0,
            languages TEXT NOT NULL,
            num_languages INTEGER NOT NULL,
            cdi_type TEXT NOT NULL,
            hard_of_hearing INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            CHECK (gender IN (1, 2, 3)),
            CHECK (age > 0),
            CHECK (session_num > 0),
            CHECK (total_num_sessions > 0),
            CHECK (words_spoken >= 0),
            CHECK (items_excluded >= 0),
            CHECK (percentile >= 0 AND percentile <= 100),
            CHECK (extra_categories >= 0),
            CHECK (revision >= 0),
            CHECK (num_languages > 0),
            CHECK (hard_of_hearing IN (0, 1)),
            CHECK (deleted IN (0, 1))
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_child ON snapshots(child_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_study ON snapshots(study, study_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_deleted ON snapshots(deleted)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the snapshot_content table
///
/// Word-level entries; rows are owned by their snapshot and cascade on
/// delete.
pub async fn create_snapshot_content_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshot_content (
            snapshot_id INTEGER NOT NULL REFERENCES snapshots(database_id) ON DELETE CASCADE,
            word TEXT NOT NULL,
            value INTEGER NOT NULL,
            revision INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (snapshot_id, word)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_snapshot_content_snapshot ON snapshot_content(snapshot_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the format metadata tables
///
/// Metadata rows only; format bodies live on the filesystem as YAML
/// (checklist, presentation) or CSV (percentile).
pub async fn create_format_metadata_tables(pool: &SqlitePool) -> Result<()> {
    for table in ["cdi_formats", "presentation_formats", "percentile_tables"] {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                safe_name TEXT PRIMARY KEY,
                human_name TEXT NOT NULL,
                filename TEXT NOT NULL
            )
            "#,
            table
        );
        sqlx::query(&sql).execute(pool).await?;
    }

    Ok(())
}
