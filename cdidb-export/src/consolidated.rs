//! Consolidated CSV rendering
//!
//! Layout is column-major: column 0 carries the fixed metadata labels and
//! then the word tokens in the checklist's declared order; every other
//! column is one snapshot. The same layout reads straight back through the
//! ingest automaton.

use cdidb_common::constants::{canonical_word, DEFAULT_CDI_TYPE, NO_DATA};
use cdidb_common::db::models::{SnapshotMetadata, WordEntry};
use cdidb_common::db::snapshots::load_contents;
use cdidb_common::{Error, Result};
use cdidb_formats::{ChecklistFormat, FormatRegistry, PresentationFormat};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Fixed header-column labels, rows 0..19
pub const METADATA_HEADER_LABELS: [&str; 20] = [
    "database id",
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

/// A snapshot paired with its word contents, ready to serialize
#[derive(Debug, Clone)]
pub struct ExportSnapshot {
    pub metadata: SnapshotMetadata,
    pub contents: Vec<WordEntry>,
}

/// Sort snapshots by (session_num, study_id), study_id compared as a string
pub fn sort_snapshots(snapshots: &mut [ExportSnapshot]) {
    snapshots.sort_by(|a, b| {
        (a.metadata.session_num, &a.metadata.study_id)
            .cmp(&(b.metadata.session_num, &b.metadata.study_id))
    });
}

/// Render a snapshot set as one consolidated CSV.
///
/// `format` supplies the word-row order; `presentation` optionally rewrites
/// sentinel codes to display strings. The caller is responsible for sorting.
pub fn render_consolidated(
    snapshots: &[ExportSnapshot],
    format: &ChecklistFormat,
    presentation: Option<&PresentationFormat>,
) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let value_maps: Vec<HashMap<String, i64>> = snapshots
        .iter()
        .map(|snapshot| {
            snapshot
                .contents
                .iter()
                .map(|entry| (entry.word.clone(), entry.value))
                .collect()
        })
        .collect();

    for (row, label) in METADATA_HEADER_LABELS.iter().enumerate() {
        let mut cells = Vec::with_capacity(snapshots.len() + 1);
        cells.push(label.to_string());
        for snapshot in snapshots {
            cells.push(metadata_cell(&snapshot.metadata, row, presentation));
        }
        writer.write_record(&cells)?;
    }

    for token in format.word_tokens() {
        let canonical = canonical_word(token);
        let mut cells = Vec::with_capacity(snapshots.len() + 1);
        cells.push(token.to_string());
        for values in &value_maps {
            let value = values.get(&canonical).copied().unwrap_or(NO_DATA);
            cells.push(word_cell(value, presentation));
        }
        writer.write_record(&cells)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::Internal(format!("CSV not UTF-8: {}", e)))
}

fn metadata_cell(
    metadata: &SnapshotMetadata,
    row: usize,
    presentation: Option<&PresentationFormat>,
) -> String {
    match METADATA_HEADER_LABELS[row] {
        "database id" => metadata
            .database_id
            .map(|id| id.to_string())
            .unwrap_or_default(),
        "child id" => metadata.child_id.clone().unwrap_or_default(),
        "study id" => metadata.study_id.clone(),
        "study" => metadata.study.clone(),
        "gender" => presentation
            .and_then(|p| p.gender_label(metadata.gender))
            .map(str::to_string)
            .unwrap_or_else(|| metadata.gender.to_string()),
        "age" => metadata.age.to_string(),
        "birthday" => metadata.birthday.clone(),
        "session date" => metadata.session_date.clone(),
        "session num" => metadata.session_num.to_string(),
        "total num sessions" => metadata.total_num_sessions.to_string(),
        "words spoken" => metadata.words_spoken.to_string(),
        "items excluded" => metadata.items_excluded.to_string(),
        "percentile" => metadata.percentile.to_string(),
        "extra categories" => metadata.extra_categories.to_string(),
        "revision" => metadata.revision.to_string(),
        "languages" => metadata.languages_joined(),
        "num languages" => metadata.num_languages.to_string(),
        "cdi type" => metadata.cdi_type.clone(),
        "hard of hearing" => boolean_cell(metadata.hard_of_hearing, presentation),
        "deleted" => boolean_cell(metadata.deleted, presentation),
        other => unreachable!("unhandled header label '{}'", other),
    }
}

fn boolean_cell(value: i64, presentation: Option<&PresentationFormat>) -> String {
    presentation
        .and_then(|p| p.boolean_label(value))
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

fn word_cell(value: i64, presentation: Option<&PresentationFormat>) -> String {
    presentation
        .and_then(|p| p.word_value_label(value))
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

/// Resolve the word-order format for a snapshot set: the first snapshot's
/// checklist, falling back to the default checklist when unknown.
pub(crate) async fn resolve_word_order_format(
    registry: &FormatRegistry,
    snapshots: &[ExportSnapshot],
) -> Result<Arc<ChecklistFormat>> {
    if let Some(first) = snapshots.first() {
        if let Some(format) = registry.load_cdi_format(&first.metadata.cdi_type).await? {
            return Ok(format);
        }
        debug!(
            "checklist format '{}' unknown, exporting with '{}'",
            first.metadata.cdi_type, DEFAULT_CDI_TYPE
        );
    }
    registry
        .load_cdi_format(DEFAULT_CDI_TYPE)
        .await?
        .ok_or_else(|| Error::NotFound(format!("checklist format '{}'", DEFAULT_CDI_TYPE)))
}

/// Fetch contents for a snapshot set and render the consolidated CSV
pub async fn export_consolidated(
    pool: &SqlitePool,
    registry: &FormatRegistry,
    snapshots: Vec<SnapshotMetadata>,
    presentation: Option<&PresentationFormat>,
) -> Result<String> {
    let mut export_set = Vec::with_capacity(snapshots.len());
    for metadata in snapshots {
        let database_id = metadata.database_id.ok_or_else(|| {
            Error::InvalidInput("cannot export snapshot without database_id".to_string())
        })?;
        let contents = load_contents(pool, database_id).await?;
        export_set.push(ExportSnapshot { metadata, contents });
    }
    sort_snapshots(&mut export_set);

    let format = resolve_word_order_format(registry, &export_set).await?;
    render_consolidated(&export_set, &format, presentation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdidb_formats::model::{
        ChecklistDetails, FormatMeta, PercentileRefs, WordCategory, WordOption,
    };

    fn test_format() -> ChecklistFormat {
        ChecklistFormat {
            safe_name: "test_cdi".to_string(),
            human_name: "Test CDI".to_string(),
            filename: "test_cdi.yaml".to_string(),
            details: ChecklistDetails {
                meta: FormatMeta { cdi_type: "test_cdi".to_string() },
                categories: vec![WordCategory {
                    name: None,
                    language: "english".to_string(),
                    words: vec![
                        "word1".to_string(),
                        "word2".to_string(),
                        "word3".to_string(),
                        "word4".to_string(),
                    ],
                }],
                options: vec![
                    WordOption { name: "not said".to_string(), value: 0, prefill_value: None },
                    WordOption { name: "said".to_string(), value: 1, prefill_value: None },
                ],
                count_as_spoken: vec![1],
                percentiles: PercentileRefs {
                    male: "m_table".to_string(),
                    female: "f_table".to_string(),
                    other: "f_table".to_string(),
                },
            },
        }
    }

    fn sample(study_id: &str, session_num: i64) -> ExportSnapshot {
        ExportSnapshot {
            metadata: SnapshotMetadata {
                database_id: Some(1),
                child_id: Some("42".to_string()),
                study_id: study_id.to_string(),
                study: "Alpha".to_string(),
                gender: cdidb_common::constants::MALE,
                age: 24.0,
                birthday: "2014/12/24".to_string(),
                session_date: "2016/12/24".to_string(),
                session_num,
                total_num_sessions: 1,
                words_spoken: 3,
                items_excluded: 0,
                percentile: 99.0,
                extra_categories: 0,
                revision: 0,
                languages: vec!["english".to_string()],
                num_languages: 1,
                cdi_type: "test_cdi".to_string(),
                hard_of_hearing: 0,
                deleted: 0,
            },
            contents: vec![
                WordEntry { word: "word1".into(), value: 1, revision: 0 },
                WordEntry { word: "word2".into(), value: 1, revision: 0 },
                WordEntry { word: "word3".into(), value: 1, revision: 0 },
                WordEntry { word: "word4".into(), value: 0, revision: 0 },
            ],
        }
    }

    fn grid(csv_text: &str) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(csv_text.as_bytes());
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_layout_rows_and_column() {
        let format = test_format();
        let csv_text = render_consolidated(&[sample("S01", 1)], &format, None).unwrap();
        let rows = grid(&csv_text);

        assert_eq!(rows.len(), 24);
        for (i, label) in METADATA_HEADER_LABELS.iter().enumerate() {
            assert_eq!(rows[i][0], *label);
        }
        assert_eq!(rows[20][0], "word1");
        assert_eq!(rows[23][0], "word4");

        // Snapshot column
        assert_eq!(rows[0][1], "1"); // database id
        assert_eq!(rows[1][1], "42");
        assert_eq!(rows[4][1], "1"); // gender sentinel
        assert_eq!(rows[5][1], "24");
        assert_eq!(rows[6][1], "2014/12/24");
        assert_eq!(rows[20][1], "1");
        assert_eq!(rows[23][1], "0");
    }

    #[test]
    fn test_missing_words_emit_no_data() {
        let format = test_format();
        let mut snapshot = sample("S01", 1);
        snapshot.contents.retain(|entry| entry.word != "word3");

        let csv_text = render_consolidated(&[snapshot], &format, None).unwrap();
        let rows = grid(&csv_text);
        assert_eq!(rows[22][1], NO_DATA.to_string());
    }

    #[test]
    fn test_presentation_translation() {
        let format = test_format();
        let mut details = HashMap::new();
        details.insert("male".to_string(), "male".to_string());
        details.insert("explicit_false".to_string(), "false".to_string());
        details.insert("no_data".to_string(), "na".to_string());
        details.insert("1".to_string(), "said".to_string());
        details.insert("0".to_string(), "not said".to_string());
        let presentation = PresentationFormat {
            safe_name: "standard".to_string(),
            human_name: "Standard".to_string(),
            filename: "standard.yaml".to_string(),
            details,
        };

        let mut snapshot = sample("S01", 1);
        snapshot.contents.retain(|entry| entry.word != "word3");
        let csv_text = render_consolidated(&[snapshot], &format, Some(&presentation)).unwrap();
        let rows = grid(&csv_text);

        assert_eq!(rows[4][1], "male");
        assert_eq!(rows[18][1], "false"); // hard of hearing
        assert_eq!(rows[20][1], "said");
        assert_eq!(rows[22][1], "na");
        assert_eq!(rows[23][1], "not said");
    }

    #[test]
    fn test_sort_by_session_then_study_id() {
        let mut snapshots = vec![sample("B", 2), sample("A", 2), sample("C", 1)];
        sort_snapshots(&mut snapshots);
        let order: Vec<(i64, &str)> = snapshots
            .iter()
            .map(|s| (s.metadata.session_num, s.metadata.study_id.as_str()))
            .collect();
        assert_eq!(order, vec![(1, "C"), (2, "A"), (2, "B")]);
    }

    #[test]
    fn test_non_ascii_passthrough() {
        let mut format = test_format();
        format.details.categories[0].words[0] = "mamá".to_string();
        let mut snapshot = sample("S01", 1);
        snapshot.contents[0].word = "mamá".to_string();

        let csv_text = render_consolidated(&[snapshot], &format, None).unwrap();
        assert!(csv_text.contains("mamá"));
        let rows = grid(&csv_text);
        assert_eq!(rows[20][0], "mamá");
        assert_eq!(rows[20][1], "1");
    }
}
