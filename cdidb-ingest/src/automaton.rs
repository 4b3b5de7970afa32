//! Column-major ingest automaton
//!
//! The input sheet carries one row per field and one column per participant
//! session. The label column is consumed once as the header: it fixes
//! whether a `database id` row is present and which word tokens every
//! record must supply values for. Each subsequent column is then walked by
//! a finite-state machine with one transition function per field.
//!
//! The error state is a latched sink: after the first failure all further
//! input is dropped and the batch reports a single column-indexed error.

use crate::builder::{ParsedRecord, Provided, RecordBuilder};
use crate::values::{parse_boolean, parse_gender, parse_strict_float, parse_strict_int};
use cdidb_common::constants::{canonical_word, NO_DATA};
use cdidb_common::dates::normalize_date;
use cdidb_common::{Error, Result};
use cdidb_formats::ChecklistFormat;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Metadata row labels, in required order, after the optional `database id`
/// row
const METADATA_LABELS: [&str; 19] = [
    "child id",
    "study id",
    "study",
    "gender",
    "age",
    "birthday",
    "session date",
    "session num",
    "total num sessions",
    "words spoken",
    "items excluded",
    "percentile",
    "extra categories",
    "revision",
    "languages",
    "num languages",
    "cdi type",
    "hard of hearing",
    "deleted",
];

/// Automaton states. One record column steps through these in order, then
/// loops back to the record start for the next column.
#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    DatabaseId,
    ChildId,
    StudyId,
    Study,
    Gender,
    Age,
    Birthday,
    SessionDate,
    SessionNum,
    TotalNumSessions,
    WordsSpoken,
    ItemsExcluded,
    Percentile,
    ExtraCategories,
    Revision,
    Languages,
    NumLanguages,
    CdiType,
    HardOfHearing,
    Deleted,
    Word(usize),
    Error,
}

/// Fixed facts established by the header column
#[derive(Debug, Clone)]
struct Header {
    has_database_id: bool,
    /// Canonical word identifiers in declared sheet order
    words: Vec<String>,
}

impl Header {
    fn parse(grid: &[Vec<String>]) -> Result<Self> {
        let label = |row: usize| -> String {
            grid.get(row)
                .and_then(|cells| cells.first())
                .map(|cell| cell.trim().to_lowercase().replace('_', " "))
                .unwrap_or_default()
        };

        let has_database_id = label(0) == "database id";
        let first_metadata_row = if has_database_id { 1 } else { 0 };

        for (offset, expected) in METADATA_LABELS.iter().enumerate() {
            let row = first_metadata_row + offset;
            let found = label(row);
            if found.is_empty() {
                return Err(Error::ingest(0, format!("missing row label '{}'", expected)));
            }
            if found != *expected {
                return Err(Error::ingest(
                    0,
                    format!("unexpected row label '{}', expected '{}'", found, expected),
                ));
            }
        }

        let mut words = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for row in (first_metadata_row + METADATA_LABELS.len())..grid.len() {
            let raw = grid[row]
                .first()
                .map(|cell| cell.trim().to_string())
                .unwrap_or_default();
            if raw.is_empty() {
                return Err(Error::ingest(0, format!("missing word label in row {}", row)));
            }
            let canonical = canonical_word(&raw);
            if !seen.insert(canonical.clone()) {
                return Err(Error::ingest(
                    0,
                    format!("duplicate word label '{}' in header", canonical),
                ));
            }
            words.push(canonical);
        }

        Ok(Self {
            has_database_id,
            words,
        })
    }

    fn record_start(&self) -> State {
        if self.has_database_id {
            State::DatabaseId
        } else {
            State::ChildId
        }
    }
}

/// The ingest state machine. Pure CPU: checklist formats are prefetched by
/// the caller so cdi_type cells resolve without touching persistence.
pub struct Automaton<'a> {
    formats: &'a HashMap<String, Arc<ChecklistFormat>>,
    header: Header,
    state: State,
    builder: RecordBuilder,
    records: Vec<ParsedRecord>,
    error: Option<Error>,
}

impl<'a> Automaton<'a> {
    /// Parse a whole ingest sheet into records, or the first column-indexed
    /// error.
    pub fn parse(
        text: &str,
        formats: &'a HashMap<String, Arc<ChecklistFormat>>,
    ) -> Result<Vec<ParsedRecord>> {
        let grid = read_grid(text)?;
        if grid.is_empty() {
            return Err(Error::InvalidInput("ingest sheet is empty".to_string()));
        }

        let header = Header::parse(&grid)?;
        let start = header.record_start();
        let mut automaton = Automaton {
            formats,
            header,
            state: start,
            builder: RecordBuilder::new(1),
            records: Vec::new(),
            error: None,
        };

        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        for column in 1..width {
            let cells: Vec<String> = (0..grid.len())
                .map(|row| {
                    grid[row]
                        .get(column)
                        .map(|cell| cell.trim().to_string())
                        .unwrap_or_default()
                })
                .collect();
            // Blank columns (trailing separators in hand-edited sheets) are
            // not records
            if cells.iter().all(String::is_empty) {
                continue;
            }
            automaton.feed_column(column, &cells);
        }

        match automaton.error {
            Some(error) => Err(error),
            None => Ok(automaton.records),
        }
    }

    fn feed_column(&mut self, column: usize, cells: &[String]) {
        if self.error.is_some() {
            // Latched: drop the rest of the input silently
            return;
        }
        self.builder = RecordBuilder::new(column);
        for cell in cells {
            self.step(cell);
        }
    }

    fn step(&mut self, cell: &str) {
        if self.state == State::Error {
            return;
        }
        let result = self.transition(cell);
        match result {
            Ok(next) => self.state = next,
            Err(error) => {
                debug!("ingest automaton latched: {}", error);
                self.error = Some(error);
                self.state = State::Error;
            }
        }
    }

    fn transition(&mut self, cell: &str) -> Result<State> {
        match self.state {
            State::DatabaseId => self.on_database_id(cell),
            State::ChildId => self.on_child_id(cell),
            State::StudyId => self.on_study_id(cell),
            State::Study => self.on_study(cell),
            State::Gender => self.on_gender(cell),
            State::Age => self.on_age(cell),
            State::Birthday => self.on_birthday(cell),
            State::SessionDate => self.on_session_date(cell),
            State::SessionNum => self.on_session_num(cell),
            State::TotalNumSessions => self.on_total_num_sessions(cell),
            State::WordsSpoken => self.on_words_spoken(cell),
            State::ItemsExcluded => self.on_items_excluded(cell),
            State::Percentile => self.on_percentile(cell),
            State::ExtraCategories => self.on_extra_categories(cell),
            State::Revision => self.on_revision(cell),
            State::Languages => self.on_languages(cell),
            State::NumLanguages => self.on_num_languages(cell),
            State::CdiType => self.on_cdi_type(cell),
            State::HardOfHearing => self.on_hard_of_hearing(cell),
            State::Deleted => self.on_deleted(cell),
            State::Word(index) => self.on_word(index, cell),
            State::Error => unreachable!("step filters the error state"),
        }
    }

    fn fail(&self, message: impl Into<String>) -> Error {
        Error::ingest(self.builder.column, message.into())
    }

    /// Non-negative counter cell that defaults to 0 when left blank
    fn counter_or_zero(&self, cell: &str, label: &str) -> Result<i64> {
        if cell.is_empty() {
            return Ok(0);
        }
        let value = parse_strict_int(cell).map_err(|e| self.fail(format!("{}: {}", label, e)))?;
        if value < 0 {
            return Err(self.fail(format!("{} may not be negative, got {}", label, value)));
        }
        Ok(value)
    }

    fn on_database_id(&mut self, cell: &str) -> Result<State> {
        if !cell.is_empty() {
            let id = parse_strict_int(cell).map_err(|e| self.fail(format!("database id: {}", e)))?;
            if id <= 0 {
                return Err(self.fail(format!("database id must be positive, got {}", id)));
            }
            self.builder.database_id = Some(id);
        }
        Ok(State::ChildId)
    }

    fn on_child_id(&mut self, cell: &str) -> Result<State> {
        if !cell.is_empty() {
            self.builder.child_id = Some(cell.to_string());
        }
        Ok(State::StudyId)
    }

    fn on_study_id(&mut self, cell: &str) -> Result<State> {
        if cell.is_empty() {
            return Err(self.fail("study id may not be empty"));
        }
        self.builder.study_id = Some(cell.to_string());
        Ok(State::Study)
    }

    fn on_study(&mut self, cell: &str) -> Result<State> {
        if cell.is_empty() {
            return Err(self.fail("study may not be empty"));
        }
        self.builder.study = Some(cell.to_string());
        Ok(State::Gender)
    }

    fn on_gender(&mut self, cell: &str) -> Result<State> {
        let gender = parse_gender(cell).map_err(|e| self.fail(e))?;
        self.builder.gender = Some(gender);
        Ok(State::Age)
    }

    fn on_age(&mut self, cell: &str) -> Result<State> {
        if cell.is_empty() {
            self.builder.age = Some(Provided::Deferred);
        } else {
            let age = parse_strict_float(cell).map_err(|e| self.fail(format!("age: {}", e)))?;
            if age <= 0.0 {
                return Err(self.fail(format!("age must be positive, got {}", age)));
            }
            self.builder.age = Some(Provided::Given(age));
        }
        Ok(State::Birthday)
    }

    fn on_birthday(&mut self, cell: &str) -> Result<State> {
        let date = normalize_date(cell).map_err(|_| self.fail(format!("birthday: unparseable date '{}'", cell)))?;
        self.builder.birthday = Some(date);
        Ok(State::SessionDate)
    }

    fn on_session_date(&mut self, cell: &str) -> Result<State> {
        let date = normalize_date(cell)
            .map_err(|_| self.fail(format!("session date: unparseable date '{}'", cell)))?;
        self.builder.session_date = Some(date);
        Ok(State::SessionNum)
    }

    fn on_session_num(&mut self, cell: &str) -> Result<State> {
        if cell.is_empty() {
            self.builder.session_num = Some(Provided::Deferred);
        } else {
            let num =
                parse_strict_int(cell).map_err(|e| self.fail(format!("session num: {}", e)))?;
            if num <= 0 {
                return Err(self.fail(format!("session num must be positive, got {}", num)));
            }
            self.builder.session_num = Some(Provided::Given(num));
        }
        Ok(State::TotalNumSessions)
    }

    fn on_total_num_sessions(&mut self, cell: &str) -> Result<State> {
        let num = parse_strict_int(cell)
            .map_err(|e| self.fail(format!("total num sessions: {}", e)))?;
        if num <= 0 {
            return Err(self.fail(format!("total num sessions must be positive, got {}", num)));
        }
        self.builder.total_num_sessions = Some(num);
        Ok(State::WordsSpoken)
    }

    fn on_words_spoken(&mut self, cell: &str) -> Result<State> {
        if cell.is_empty() {
            self.builder.words_spoken = Some(Provided::Deferred);
        } else {
            let count =
                parse_strict_int(cell).map_err(|e| self.fail(format!("words spoken: {}", e)))?;
            if count < 0 {
                return Err(self.fail(format!("words spoken may not be negative, got {}", count)));
            }
            self.builder.words_spoken = Some(Provided::Given(count));
        }
        Ok(State::ItemsExcluded)
    }

    fn on_items_excluded(&mut self, cell: &str) -> Result<State> {
        self.builder.items_excluded = Some(self.counter_or_zero(cell, "items excluded")?);
        Ok(State::Percentile)
    }

    fn on_percentile(&mut self, cell: &str) -> Result<State> {
        if cell.is_empty() {
            self.builder.percentile = Some(Provided::Deferred);
        } else {
            let pct =
                parse_strict_float(cell).map_err(|e| self.fail(format!("percentile: {}", e)))?;
            if !(0.0..=100.0).contains(&pct) {
                return Err(self.fail(format!("percentile out of range [0, 100]: {}", pct)));
            }
            self.builder.percentile = Some(Provided::Given(pct));
        }
        Ok(State::ExtraCategories)
    }

    fn on_extra_categories(&mut self, cell: &str) -> Result<State> {
        self.builder.extra_categories = Some(self.counter_or_zero(cell, "extra categories")?);
        Ok(State::Revision)
    }

    fn on_revision(&mut self, cell: &str) -> Result<State> {
        self.builder.revision = Some(self.counter_or_zero(cell, "revision")?);
        Ok(State::Languages)
    }

    fn on_languages(&mut self, cell: &str) -> Result<State> {
        let languages: Vec<String> = cell
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if languages.is_empty() {
            return Err(self.fail("languages may not be empty"));
        }
        self.builder.languages = Some(languages);
        Ok(State::NumLanguages)
    }

    fn on_num_languages(&mut self, cell: &str) -> Result<State> {
        if cell.is_empty() {
            self.builder.num_languages = Some(Provided::Deferred);
        } else {
            let num =
                parse_strict_int(cell).map_err(|e| self.fail(format!("num languages: {}", e)))?;
            if num <= 0 {
                return Err(self.fail(format!("num languages must be positive, got {}", num)));
            }
            self.builder.num_languages = Some(Provided::Given(num));
        }
        Ok(State::CdiType)
    }

    fn on_cdi_type(&mut self, cell: &str) -> Result<State> {
        let Some(format) = self.formats.get(cell) else {
            return Err(self.fail(format!("unknown checklist format '{}'", cell)));
        };

        // The header's word set must match the format's declared word set
        // exactly (after marker strip + lowercase)
        let declared = format.canonical_words();
        let supplied: std::collections::HashSet<String> =
            self.header.words.iter().cloned().collect();
        let missing: Vec<&String> = declared.difference(&supplied).collect();
        let extra: Vec<&String> = supplied.difference(&declared).collect();
        if !missing.is_empty() || !extra.is_empty() {
            return Err(self.fail(format!(
                "word tokens do not match format '{}': {} missing, {} unexpected",
                cell,
                missing.len(),
                extra.len()
            )));
        }

        self.builder.format = Some(format.clone());
        Ok(State::HardOfHearing)
    }

    fn on_hard_of_hearing(&mut self, cell: &str) -> Result<State> {
        let value =
            parse_boolean(cell).map_err(|e| self.fail(format!("hard of hearing: {}", e)))?;
        self.builder.hard_of_hearing = Some(value);
        Ok(State::Deleted)
    }

    fn on_deleted(&mut self, cell: &str) -> Result<State> {
        let value = parse_boolean(cell).map_err(|e| self.fail(format!("deleted: {}", e)))?;
        self.builder.deleted = Some(value);
        if self.header.words.is_empty() {
            self.emit()
        } else {
            Ok(State::Word(0))
        }
    }

    fn on_word(&mut self, index: usize, cell: &str) -> Result<State> {
        let word = self.header.words[index].clone();
        if cell.is_empty() {
            return Err(self.fail(format!("word '{}' has no value", word)));
        }
        let value =
            parse_strict_int(cell).map_err(|e| self.fail(format!("word '{}': {}", word, e)))?;

        let format = self
            .builder
            .format
            .as_ref()
            .ok_or_else(|| Error::Internal("word state reached before cdi_type".to_string()))?;
        if value != NO_DATA && !format.legal_values().contains(&value) {
            return Err(self.fail(format!(
                "word '{}' value {} is not a legal option of format '{}'",
                word, value, format.safe_name
            )));
        }

        self.builder.words.push((word, value));

        if index + 1 < self.header.words.len() {
            Ok(State::Word(index + 1))
        } else {
            self.emit()
        }
    }

    fn emit(&mut self) -> Result<State> {
        let builder = std::mem::replace(&mut self.builder, RecordBuilder::new(0));
        let record = builder.build()?;
        debug!(
            "parsed record column {} ({} words)",
            record.column,
            record.words.len()
        );
        self.records.push(record);
        Ok(self.header.record_start())
    }
}

/// Read the sheet into a ragged grid of trimmed-on-demand cells
fn read_grid(text: &str) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record?;
        grid.push(record.iter().map(str::to_string).collect());
    }
    Ok(grid)
}
