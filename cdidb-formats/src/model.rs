//! Format models
//!
//! A checklist format pairs a database metadata row (safe_name, human_name,
//! filename) with a YAML body describing word categories, legal response
//! options and percentile table references. Percentile tables are CSV grids;
//! presentation formats are flat YAML maps used to translate sentinel values
//! on export.

use cdidb_common::constants::{self, canonical_word};
use cdidb_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Metadata row shared by cdi_formats / presentation_formats /
/// percentile_tables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatMetadataRow {
    pub safe_name: String,
    pub human_name: String,
    pub filename: String,
}

/// One category of checklist words
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordCategory {
    #[serde(default)]
    pub name: Option<String>,
    pub language: String,
    pub words: Vec<String>,
}

/// One legal integer response code for a checklist word
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordOption {
    pub name: String,
    pub value: i64,
    #[serde(default)]
    pub prefill_value: Option<i64>,
}

/// Percentile table references by gender
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PercentileRefs {
    pub male: String,
    pub female: String,
    pub other: String,
}

/// Checklist family identifier block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatMeta {
    pub cdi_type: String,
}

/// YAML body of a checklist format definition file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChecklistDetails {
    pub meta: FormatMeta,
    pub categories: Vec<WordCategory>,
    pub options: Vec<WordOption>,
    pub count_as_spoken: Vec<i64>,
    pub percentiles: PercentileRefs,
}

/// A resolved checklist format: metadata row plus parsed body
#[derive(Debug, Clone, PartialEq)]
pub struct ChecklistFormat {
    pub safe_name: String,
    pub human_name: String,
    pub filename: String,
    pub details: ChecklistDetails,
}

impl ChecklistFormat {
    /// Word tokens in declared order: category order, then intra-category
    /// order. Tokens keep their markers.
    pub fn word_tokens(&self) -> impl Iterator<Item = &str> {
        self.details
            .categories
            .iter()
            .flat_map(|c| c.words.iter())
            .map(|w| w.as_str())
    }

    /// Total number of checklist words across all categories
    pub fn max_words(&self) -> i64 {
        self.details
            .categories
            .iter()
            .map(|c| c.words.len() as i64)
            .sum()
    }

    /// Integer codes that count a word as spoken
    pub fn count_as_spoken(&self) -> HashSet<i64> {
        self.details.count_as_spoken.iter().copied().collect()
    }

    /// Legal cell values: declared option values plus any prefill values
    pub fn legal_values(&self) -> HashSet<i64> {
        let mut values: HashSet<i64> = self.details.options.iter().map(|o| o.value).collect();
        values.extend(self.details.options.iter().filter_map(|o| o.prefill_value));
        values
    }

    /// Percentile table safe_name for the given gender sentinel
    pub fn percentile_table_name(&self, gender: i64) -> &str {
        if gender == constants::MALE {
            &self.details.percentiles.male
        } else if gender == constants::FEMALE {
            &self.details.percentiles.female
        } else {
            &self.details.percentiles.other
        }
    }

    /// Canonical identifier set of the declared word tokens
    pub fn canonical_words(&self) -> HashSet<String> {
        self.word_tokens().map(canonical_word).collect()
    }

    /// Structural invariants every checklist body must satisfy
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for token in self.word_tokens() {
            let canonical = canonical_word(token);
            if !seen.insert(canonical.clone()) {
                return Err(Error::FormatDefinition(format!(
                    "duplicate word token '{}' in format '{}'",
                    canonical, self.safe_name
                )));
            }
        }

        let option_values: HashSet<i64> =
            self.details.options.iter().map(|o| o.value).collect();
        for code in &self.details.count_as_spoken {
            if !option_values.contains(code) {
                return Err(Error::FormatDefinition(format!(
                    "count_as_spoken value {} is not a declared option of format '{}'",
                    code, self.safe_name
                )));
            }
        }

        Ok(())
    }
}

/// Presentation format: sentinel-name keyed display strings.
///
/// Keys `male`, `female`, `other_gender`, `explicit_true`, `explicit_false`
/// and `no_data` translate the corresponding sentinels; numeric-string keys
/// translate word values.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationFormat {
    pub safe_name: String,
    pub human_name: String,
    pub filename: String,
    pub details: std::collections::HashMap<String, String>,
}

impl PresentationFormat {
    /// Display string for a gender sentinel, if mapped
    pub fn gender_label(&self, value: i64) -> Option<&str> {
        let key = if value == constants::MALE {
            "male"
        } else if value == constants::FEMALE {
            "female"
        } else if value == constants::OTHER_GENDER {
            "other_gender"
        } else {
            return None;
        };
        self.details.get(key).map(|s| s.as_str())
    }

    /// Display string for a boolean-like sentinel, if mapped
    pub fn boolean_label(&self, value: i64) -> Option<&str> {
        let key = if value == constants::EXPLICIT_TRUE {
            "explicit_true"
        } else if value == constants::EXPLICIT_FALSE {
            "explicit_false"
        } else {
            return None;
        };
        self.details.get(key).map(|s| s.as_str())
    }

    /// Display string for a word value, if mapped
    pub fn word_value_label(&self, value: i64) -> Option<&str> {
        if value == constants::NO_DATA {
            if let Some(label) = self.details.get("no_data") {
                return Some(label.as_str());
            }
        }
        self.details.get(&value.to_string()).map(|s| s.as_str())
    }
}

/// A two-dimensional percentile lookup table.
///
/// Row 0: label cell then ages-in-months ascending. Column 0 of rows 1..:
/// percentile ranks descending. Cell (i, j): the spoken-word count marking
/// the lower bound of rank i at age column j.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileTable {
    pub safe_name: String,
    pub human_name: String,
    pub filename: String,
    pub values: Vec<Vec<f64>>,
}

impl PercentileTable {
    /// Structural invariants every percentile table must satisfy
    pub fn validate(&self) -> Result<()> {
        if self.values.len() < 2 || self.values[0].len() < 2 {
            return Err(Error::FormatDefinition(format!(
                "percentile table '{}' needs a header row and at least one rank row",
                self.safe_name
            )));
        }

        let width = self.values[0].len();
        for (i, row) in self.values.iter().enumerate() {
            if row.len() != width {
                return Err(Error::FormatDefinition(format!(
                    "percentile table '{}' row {} has {} cells, expected {}",
                    self.safe_name,
                    i,
                    row.len(),
                    width
                )));
            }
        }

        let months = &self.values[0][1..];
        if months.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::FormatDefinition(format!(
                "percentile table '{}' months are not ascending",
                self.safe_name
            )));
        }

        let ranks: Vec<f64> = self.values[1..].iter().map(|row| row[0]).collect();
        if ranks.windows(2).any(|w| w[0] <= w[1]) {
            return Err(Error::FormatDefinition(format!(
                "percentile table '{}' ranks are not descending",
                self.safe_name
            )));
        }

        Ok(())
    }
}
