//! Database models

use serde::{Deserialize, Serialize};
use sqlx::Row;

/// One participant session: metadata row of the snapshots table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotMetadata {
    /// Assigned by the database on insert
    pub database_id: Option<i64>,
    /// Global cross-study participant id
    pub child_id: Option<String>,
    /// Within-study participant id
    pub study_id: String,
    pub study: String,
    /// Gender sentinel (constants::MALE / FEMALE / OTHER_GENDER)
    pub gender: i64,
    /// Age in months at session_date
    pub age: f64,
    /// Canonical `YYYY/MM/DD`
    pub birthday: String,
    /// Canonical `YYYY/MM/DD`
    pub session_date: String,
    pub session_num: i64,
    pub total_num_sessions: i64,
    pub words_spoken: i64,
    pub items_excluded: i64,
    /// Percentile rank in [0, 100]
    pub percentile: f64,
    pub extra_categories: i64,
    pub revision: i64,
    pub languages: Vec<String>,
    pub num_languages: i64,
    /// safe_name of the checklist format this snapshot was collected with
    pub cdi_type: String,
    /// constants::EXPLICIT_TRUE / EXPLICIT_FALSE
    pub hard_of_hearing: i64,
    /// 0 = live, 1 = soft-deleted
    pub deleted: i64,
}

impl SnapshotMetadata {
    /// Inflate from a snapshots row. `languages` is comma-split back into a
    /// list.
    pub fn from_row(row: &sqlx::sqlite::SqliteRow) -> Self {
        let languages: String = row.get("languages");
        Self {
            database_id: Some(row.get("database_id")),
            child_id: row.get("child_id"),
            study_id: row.get("study_id"),
            study: row.get("study"),
            gender: row.get("gender"),
            age: row.get("age"),
            birthday: row.get("birthday"),
            session_date: row.get("session_date"),
            session_num: row.get("session_num"),
            total_num_sessions: row.get("total_num_sessions"),
            words_spoken: row.get("words_spoken"),
            items_excluded: row.get("items_excluded"),
            percentile: row.get("percentile"),
            extra_categories: row.get("extra_categories"),
            revision: row.get("revision"),
            languages: split_languages(&languages),
            num_languages: row.get("num_languages"),
            cdi_type: row.get("cdi_type"),
            hard_of_hearing: row.get("hard_of_hearing"),
            deleted: row.get("deleted"),
        }
    }

    /// Comma-joined form stored in the languages column
    pub fn languages_joined(&self) -> String {
        self.languages.join(",")
    }
}

/// One word-level entry of a snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordEntry {
    pub word: String,
    pub value: i64,
    pub revision: i64,
}

fn split_languages(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_languages_handles_empty() {
        assert_eq!(split_languages(""), Vec::<String>::new());
        assert_eq!(split_languages("english"), vec!["english"]);
        assert_eq!(split_languages("english,spanish"), vec!["english", "spanish"]);
    }
}
