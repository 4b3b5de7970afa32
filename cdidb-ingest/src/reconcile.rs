//! Record reconciliation
//!
//! Every derived field a researcher may hand-fill is recomputed
//! independently. Supplied values must agree with the recomputed ones
//! (within tolerance for age and percentile, exactly for the counters);
//! deferred values are filled unconditionally.

use crate::builder::{ParsedRecord, Provided};
use cdidb_common::dates::{months_between, parse_date};
use cdidb_common::db::models::{SnapshotMetadata, WordEntry};
use cdidb_common::db::snapshots::prior_session_count;
use cdidb_common::{Error, Result};
use cdidb_formats::FormatRegistry;
use sqlx::SqliteConnection;

/// Accepted drift between a reported age and the recomputed age, in months
const AGE_TOLERANCE: f64 = 1.0;
/// Accepted drift between a reported percentile and the recomputed one
const PERCENTILE_TOLERANCE: f64 = 1.0;

/// A record that passed reconciliation, ready to persist
#[derive(Debug, Clone)]
pub struct ReconciledRecord {
    pub metadata: SnapshotMetadata,
    pub contents: Vec<WordEntry>,
    /// Carried through from the sheet's optional `database id` row
    pub source_database_id: Option<i64>,
}

/// Reconcile one parsed record against recomputed values.
///
/// Needs a connection for the prior-session count behind deferred session
/// numbers; runs inside the ingest batch transaction.
pub async fn reconcile_record(
    conn: &mut SqliteConnection,
    registry: &FormatRegistry,
    record: &ParsedRecord,
) -> Result<ReconciledRecord> {
    let column = record.column;

    let birthday = parse_date(&record.birthday)?;
    let session_date = parse_date(&record.session_date)?;
    if session_date < birthday {
        return Err(Error::ingest(
            column,
            format!(
                "session date {} precedes birthday {}",
                record.session_date, record.birthday
            ),
        ));
    }

    let expected_age = months_between(birthday, session_date);
    let age = match record.age {
        Provided::Given(reported) => {
            if (reported - expected_age).abs() > AGE_TOLERANCE {
                return Err(Error::ingest(
                    column,
                    format!(
                        "age mismatch: reported {} but computed {:.2}",
                        reported, expected_age
                    ),
                ));
            }
            reported
        }
        Provided::Deferred => expected_age,
    };

    let spoken_codes = record.format.count_as_spoken();
    let counted = record
        .words
        .iter()
        .filter(|(_, value)| spoken_codes.contains(value))
        .count() as i64;
    let words_spoken = match record.words_spoken {
        Provided::Given(reported) => {
            if reported != counted {
                return Err(Error::ingest(
                    column,
                    format!(
                        "num words mismatch: reported {} but counted {}",
                        reported, counted
                    ),
                ));
            }
            reported
        }
        Provided::Deferred => counted,
    };

    let language_count = record.languages.len() as i64;
    let num_languages = match record.num_languages {
        Provided::Given(reported) => {
            if reported != language_count {
                return Err(Error::ingest(
                    column,
                    format!(
                        "num languages mismatch: reported {} but counted {}",
                        reported, language_count
                    ),
                ));
            }
            reported
        }
        Provided::Deferred => language_count,
    };

    let session_num = match record.session_num {
        Provided::Given(reported) => reported,
        Provided::Deferred => {
            1 + prior_session_count(conn, &record.study, &record.study_id).await?
        }
    };

    let table = registry
        .percentile_table_for(&record.format, record.gender)
        .await?;
    let expected_percentile = table.find_percentile(words_spoken, age, record.format.max_words());
    let percentile = match record.percentile {
        Provided::Given(reported) => {
            if (reported - expected_percentile).abs() > PERCENTILE_TOLERANCE {
                return Err(Error::ingest(
                    column,
                    format!(
                        "percentile mismatch: reported {} but computed {:.2}",
                        reported, expected_percentile
                    ),
                ));
            }
            reported
        }
        Provided::Deferred => expected_percentile,
    };

    let contents = record
        .words
        .iter()
        .map(|(word, value)| WordEntry {
            word: word.clone(),
            value: *value,
            revision: record.revision,
        })
        .collect();

    let metadata = SnapshotMetadata {
        database_id: None,
        child_id: record.child_id.clone(),
        study_id: record.study_id.clone(),
        study: record.study.clone(),
        gender: record.gender,
        age,
        birthday: record.birthday.clone(),
        session_date: record.session_date.clone(),
        session_num,
        total_num_sessions: record.total_num_sessions,
        words_spoken,
        items_excluded: record.items_excluded,
        percentile,
        extra_categories: record.extra_categories,
        revision: record.revision,
        languages: record.languages.clone(),
        num_languages,
        cdi_type: record.format.safe_name.clone(),
        hard_of_hearing: record.hard_of_hearing,
        deleted: record.deleted,
    };

    Ok(ReconciledRecord {
        metadata,
        contents,
        source_database_id: record.database_id,
    })
}
