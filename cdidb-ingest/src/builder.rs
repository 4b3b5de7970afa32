//! Typed record builder
//!
//! Records come off the automaton with some fields deliberately left blank
//! by the researcher; those are carried as `Provided::Deferred` rather than
//! sentinel values, and filled by the reconciliation layer.

use cdidb_common::{Error, Result};
use cdidb_formats::ChecklistFormat;
use std::sync::Arc;

/// A user-suppliable derived field: given in the sheet, or deferred to the
/// reconciliation layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Provided<T> {
    Given(T),
    Deferred,
}

impl<T: Copy> Provided<T> {
    pub fn given(self) -> Option<T> {
        match self {
            Provided::Given(value) => Some(value),
            Provided::Deferred => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Provided::Deferred)
    }
}

/// One fully parsed record column, before reconciliation
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    /// Source spreadsheet column, for error reporting
    pub column: usize,
    /// Present only when the sheet carries a `database id` row
    pub database_id: Option<i64>,
    pub child_id: Option<String>,
    pub study_id: String,
    pub study: String,
    pub gender: i64,
    pub age: Provided<f64>,
    /// Canonical `YYYY/MM/DD`
    pub birthday: String,
    /// Canonical `YYYY/MM/DD`
    pub session_date: String,
    pub session_num: Provided<i64>,
    pub total_num_sessions: i64,
    pub words_spoken: Provided<i64>,
    pub items_excluded: i64,
    pub percentile: Provided<f64>,
    pub extra_categories: i64,
    pub revision: i64,
    pub languages: Vec<String>,
    pub num_languages: Provided<i64>,
    pub hard_of_hearing: i64,
    pub deleted: i64,
    /// Checklist format resolved from the cdi_type cell
    pub format: Arc<ChecklistFormat>,
    /// Word values keyed by canonical word, in declared order
    pub words: Vec<(String, i64)>,
}

/// Accumulates one record column as the automaton steps through its cells
#[derive(Debug, Default)]
pub struct RecordBuilder {
    pub column: usize,
    pub database_id: Option<i64>,
    pub child_id: Option<String>,
    pub study_id: Option<String>,
    pub study: Option<String>,
    pub gender: Option<i64>,
    pub age: Option<Provided<f64>>,
    pub birthday: Option<String>,
    pub session_date: Option<String>,
    pub session_num: Option<Provided<i64>>,
    pub total_num_sessions: Option<i64>,
    pub words_spoken: Option<Provided<i64>>,
    pub items_excluded: Option<i64>,
    pub percentile: Option<Provided<f64>>,
    pub extra_categories: Option<i64>,
    pub revision: Option<i64>,
    pub languages: Option<Vec<String>>,
    pub num_languages: Option<Provided<i64>>,
    pub hard_of_hearing: Option<i64>,
    pub deleted: Option<i64>,
    pub format: Option<Arc<ChecklistFormat>>,
    pub words: Vec<(String, i64)>,
}

impl RecordBuilder {
    pub fn new(column: usize) -> Self {
        Self {
            column,
            ..Default::default()
        }
    }

    /// Finish the record. Every mandatory field must have been stepped
    /// through; a gap here is an automaton sequencing fault, not bad input.
    pub fn build(self) -> Result<ParsedRecord> {
        let column = self.column;
        Ok(ParsedRecord {
            column,
            database_id: self.database_id,
            child_id: self.child_id,
            study_id: take(self.study_id, "study_id", column)?,
            study: take(self.study, "study", column)?,
            gender: take(self.gender, "gender", column)?,
            age: take(self.age, "age", column)?,
            birthday: take(self.birthday, "birthday", column)?,
            session_date: take(self.session_date, "session_date", column)?,
            session_num: take(self.session_num, "session_num", column)?,
            total_num_sessions: take(self.total_num_sessions, "total_num_sessions", column)?,
            words_spoken: take(self.words_spoken, "words_spoken", column)?,
            items_excluded: take(self.items_excluded, "items_excluded", column)?,
            percentile: take(self.percentile, "percentile", column)?,
            extra_categories: take(self.extra_categories, "extra_categories", column)?,
            revision: take(self.revision, "revision", column)?,
            languages: take(self.languages, "languages", column)?,
            num_languages: take(self.num_languages, "num_languages", column)?,
            hard_of_hearing: take(self.hard_of_hearing, "hard_of_hearing", column)?,
            deleted: take(self.deleted, "deleted", column)?,
            format: take(self.format, "cdi_type", column)?,
            words: self.words,
        })
    }
}

fn take<T>(field: Option<T>, name: &str, column: usize) -> Result<T> {
    field.ok_or_else(|| {
        Error::Internal(format!(
            "record in column {} finished without a {} value",
            column, name
        ))
    })
}
