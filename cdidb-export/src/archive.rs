//! Per-study archive rendering
//!
//! Groups a snapshot set by study, renders each group with the consolidated
//! layout, and packs the members into one ZIP. Member order is sorted study
//! name and member timestamps are fixed, so identical inputs produce
//! byte-identical archives.

use crate::consolidated::{
    render_consolidated, resolve_word_order_format, sort_snapshots, ExportSnapshot,
};
use cdidb_common::db::models::SnapshotMetadata;
use cdidb_common::db::snapshots::load_contents;
use cdidb_common::{Error, Result};
use cdidb_formats::{FormatRegistry, PresentationFormat};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Render one CSV per study and pack them into a ZIP.
///
/// `word_order` resolves per study group: each member uses its own first
/// snapshot's checklist order.
pub async fn export_archive(
    pool: &SqlitePool,
    registry: &FormatRegistry,
    snapshots: Vec<SnapshotMetadata>,
    presentation: Option<&PresentationFormat>,
) -> Result<Vec<u8>> {
    let mut export_set = Vec::with_capacity(snapshots.len());
    for metadata in snapshots {
        let database_id = metadata.database_id.ok_or_else(|| {
            Error::InvalidInput("cannot export snapshot without database_id".to_string())
        })?;
        let contents = load_contents(pool, database_id).await?;
        export_set.push(ExportSnapshot { metadata, contents });
    }

    // Sorted group order keeps archives deterministic
    let mut by_study: BTreeMap<String, Vec<ExportSnapshot>> = BTreeMap::new();
    for snapshot in export_set {
        by_study
            .entry(snapshot.metadata.study.clone())
            .or_default()
            .push(snapshot);
    }

    let mut members = Vec::with_capacity(by_study.len());
    for (study, mut group) in by_study {
        sort_snapshots(&mut group);
        let format = resolve_word_order_format(registry, &group).await?;
        let csv_text = render_consolidated(&group, &format, presentation)?;
        members.push((study, csv_text));
    }

    let bytes = render_archive(&members)?;
    info!("archived {} study member(s)", members.len());
    Ok(bytes)
}

/// Pack pre-rendered `(study, csv)` members into ZIP bytes.
///
/// Member timestamps are pinned to the ZIP epoch so repeated exports of the
/// same data are byte-identical.
pub fn render_archive(members: &[(String, String)]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for (study, csv_text) in members {
        writer
            .start_file(format!("{}.csv", study), options)
            .map_err(|e| Error::Internal(format!("archive member failed: {}", e)))?;
        writer.write_all(csv_text.as_bytes())?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| Error::Internal(format!("archive finish failed: {}", e)))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_members_and_determinism() {
        let members = vec![
            ("Alpha".to_string(), "a,b\n1,2\n".to_string()),
            ("Beta".to_string(), "a,b\n3,4\n".to_string()),
        ];

        let first = render_archive(&members).unwrap();
        let second = render_archive(&members).unwrap();
        assert_eq!(first, second);

        let mut archive = zip::ZipArchive::new(Cursor::new(first)).unwrap();
        assert_eq!(archive.len(), 2);
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["Alpha.csv", "Beta.csv"]);
    }

    #[test]
    fn test_member_contents_round_trip() {
        use std::io::Read;

        let members = vec![("Alpha".to_string(), "x,y\n".to_string())];
        let bytes = render_archive(&members).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut member = archive.by_name("Alpha.csv").unwrap();
        let mut text = String::new();
        member.read_to_string(&mut text).unwrap();
        assert_eq!(text, "x,y\n");
    }
}
