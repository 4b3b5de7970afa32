//! Snapshot persistence operations

use crate::db::models::{SnapshotMetadata, WordEntry};
use crate::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Insert a snapshot metadata row plus its word contents.
///
/// Runs on a connection so ingest can batch many snapshots into one
/// transaction. Returns the assigned database_id.
pub async fn insert_snapshot(
    conn: &mut SqliteConnection,
    metadata: &SnapshotMetadata,
    contents: &[WordEntry],
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO snapshots (
            child_id, study_id, study, gender, age, birthday, session_date,
            session_num, total_num_sessions, words_spoken, items_excluded,
            percentile, extra_categories, revision, languages, num_languages,
            cdi_type, hard_of_hearing, deleted
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&metadata.child_id)
    .bind(&metadata.study_id)
    .bind(&metadata.study)
    .bind(metadata.gender)
    .bind(metadata.age)
    .bind(&metadata.birthday)
    .bind(&metadata.session_date)
    .bind(metadata.session_num)
    .bind(metadata.total_num_sessions)
    .bind(metadata.words_spoken)
    .bind(metadata.items_excluded)
    .bind(metadata.percentile)
    .bind(metadata.extra_categories)
    .bind(metadata.revision)
    .bind(metadata.languages_joined())
    .bind(metadata.num_languages)
    .bind(&metadata.cdi_type)
    .bind(metadata.hard_of_hearing)
    .bind(metadata.deleted)
    .execute(&mut *conn)
    .await?;

    let snapshot_id = result.last_insert_rowid();

    for entry in contents {
        sqlx::query(
            r#"
            INSERT INTO snapshot_content (snapshot_id, word, value, revision)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(snapshot_id)
        .bind(&entry.word)
        .bind(entry.value)
        .bind(entry.revision)
        .execute(&mut *conn)
        .await?;
    }

    Ok(snapshot_id)
}

/// Load one snapshot metadata row by database id
pub async fn load_snapshot(pool: &SqlitePool, database_id: i64) -> Result<Option<SnapshotMetadata>> {
    let row = sqlx::query("SELECT * FROM snapshots WHERE database_id = ?")
        .bind(database_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(SnapshotMetadata::from_row))
}

/// Load the word contents of a snapshot, ordered by word for determinism
pub async fn load_contents(pool: &SqlitePool, snapshot_id: i64) -> Result<Vec<WordEntry>> {
    let rows = sqlx::query(
        "SELECT word, value, revision FROM snapshot_content WHERE snapshot_id = ? ORDER BY word",
    )
    .bind(snapshot_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| WordEntry {
            word: row.get("word"),
            value: row.get("value"),
            revision: row.get("revision"),
        })
        .collect())
}

/// Rewrite the metadata row of an existing snapshot
pub async fn update_snapshot_metadata(pool: &SqlitePool, metadata: &SnapshotMetadata) -> Result<()> {
    let database_id = metadata.database_id.ok_or_else(|| {
        crate::Error::InvalidInput("cannot update snapshot without database_id".to_string())
    })?;

    sqlx::query(
        r#"
        UPDATE snapshots SET
            child_id = ?, study_id = ?, study = ?, gender = ?, age = ?,
            birthday = ?, session_date = ?, session_num = ?,
            total_num_sessions = ?, words_spoken = ?, items_excluded = ?,
            percentile = ?, extra_categories = ?, revision = ?, languages = ?,
            num_languages = ?, cdi_type = ?, hard_of_hearing = ?, deleted = ?
        WHERE database_id = ?
        "#,
    )
    .bind(&metadata.child_id)
    .bind(&metadata.study_id)
    .bind(&metadata.study)
    .bind(metadata.gender)
    .bind(metadata.age)
    .bind(&metadata.birthday)
    .bind(&metadata.session_date)
    .bind(metadata.session_num)
    .bind(metadata.total_num_sessions)
    .bind(metadata.words_spoken)
    .bind(metadata.items_excluded)
    .bind(metadata.percentile)
    .bind(metadata.extra_categories)
    .bind(metadata.revision)
    .bind(metadata.languages_joined())
    .bind(metadata.num_languages)
    .bind(&metadata.cdi_type)
    .bind(metadata.hard_of_hearing)
    .bind(metadata.deleted)
    .bind(database_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Number of snapshots already stored for a `(study, study_id)` pair.
///
/// Deferred session numbers are assigned as one past this count.
pub async fn prior_session_count(
    conn: &mut SqliteConnection,
    study: &str,
    study_id: &str,
) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM snapshots WHERE study = ? AND study_id = ?")
            .bind(study)
            .bind(study_id)
            .fetch_one(conn)
            .await?;

    Ok(count)
}

/// Next unused global child id, as text.
///
/// Child ids are numeric in practice; non-numeric ids cast to 0 and never
/// collide with generated ones.
pub async fn next_child_id(conn: &mut SqliteConnection) -> Result<String> {
    let max: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(CAST(child_id AS INTEGER)) FROM snapshots WHERE child_id IS NOT NULL",
    )
    .fetch_one(conn)
    .await?;

    Ok((max.unwrap_or(0) + 1).to_string())
}
