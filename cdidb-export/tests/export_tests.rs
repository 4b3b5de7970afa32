//! Round-trip and archive integration tests
//!
//! Ingest a sheet, export it, and read the export back through the ingest
//! pipeline: the stored snapshots must survive the trip unchanged.

use cdidb_common::config::DataPaths;
use cdidb_common::db::init_memory_database;
use cdidb_export::{export_archive, export_consolidated};
use cdidb_formats::FormatRegistry;
use cdidb_ingest::run_ingest;
use cdidb_query::{run_search_query, Filter};
use sqlx::SqlitePool;
use std::io::Cursor;

const CHECKLIST_YAML: &str = r#"
meta:
  cdi_type: test_cdi
categories:
  - language: english
    words: [word1, word2, word3, word4]
options:
  - name: not said
    value: 0
  - name: said
    value: 1
count_as_spoken: [1]
percentiles:
  male: m_table
  female: f_table
  other: f_table
"#;

fn table_csv() -> String {
    let months: Vec<String> = (16..=30).map(|m| m.to_string()).collect();
    let mut body = format!("month,{}\n", months.join(","));
    for (rank, threshold) in [(99, 2), (50, 1), (25, 0)] {
        let cells: Vec<String> = (16..=30).map(|_| threshold.to_string()).collect();
        body.push_str(&format!("{},{}\n", rank, cells.join(",")));
    }
    body
}

async fn setup() -> (SqlitePool, FormatRegistry, tempfile::TempDir) {
    let pool = init_memory_database().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let paths = DataPaths::new(dir.path().to_path_buf());
    paths.ensure_dirs().unwrap();

    let registry = FormatRegistry::new(pool.clone(), &paths);
    let table = table_csv();
    registry
        .save_percentile_table("m_table", "Male norms", "m_table.csv", &table)
        .await
        .unwrap();
    registry
        .save_percentile_table("f_table", "Female norms", "f_table.csv", &table)
        .await
        .unwrap();
    registry
        .save_cdi_format("test_cdi", "Test CDI", "test_cdi.yaml", CHECKLIST_YAML)
        .await
        .unwrap();

    (pool, registry, dir)
}

fn sheet(child_id: &str, study_id: &str, study: &str, session_num: i64) -> String {
    [
        format!("child id,{}", child_id),
        format!("study id,{}", study_id),
        format!("study,{}", study),
        "gender,m".to_string(),
        "age,24".to_string(),
        "birthday,2014/12/24".to_string(),
        "session date,2016/12/24".to_string(),
        format!("session num,{}", session_num),
        "total num sessions,1".to_string(),
        "words spoken,3".to_string(),
        "items excluded,0".to_string(),
        "percentile,99".to_string(),
        "extra categories,0".to_string(),
        "revision,0".to_string(),
        "languages,english".to_string(),
        "num languages,1".to_string(),
        "cdi type,test_cdi".to_string(),
        "hard of hearing,n".to_string(),
        "deleted,n".to_string(),
        "word1,1".to_string(),
        "word2,1".to_string(),
        "word3,1".to_string(),
        "word4,0".to_string(),
    ]
    .join("\n")
}

#[tokio::test]
async fn test_consolidated_export_matches_ingested_record() {
    let (pool, registry, _dir) = setup().await;
    run_ingest(&pool, &registry, &sheet("42", "S01", "Alpha", 1))
        .await
        .unwrap();

    let snapshots = run_search_query(&pool, &[], "snapshots", true).await.unwrap();
    let csv_text = export_consolidated(&pool, &registry, snapshots, None)
        .await
        .unwrap();

    let rows: Vec<Vec<String>> = csv_text
        .lines()
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect();

    // Column 1 carries the ingested values in the fixed row order
    assert_eq!(rows[1], vec!["child id", "42"]);
    assert_eq!(rows[2], vec!["study id", "S01"]);
    assert_eq!(rows[3], vec!["study", "Alpha"]);
    assert_eq!(rows[4], vec!["gender", "1"]);
    assert_eq!(rows[5], vec!["age", "24"]);
    assert_eq!(rows[6], vec!["birthday", "2014/12/24"]);
    assert_eq!(rows[7], vec!["session date", "2016/12/24"]);
    assert_eq!(rows[10], vec!["words spoken", "3"]);
    assert_eq!(rows[12], vec!["percentile", "99"]);
    assert_eq!(rows[17], vec!["cdi type", "test_cdi"]);
    // Word values in declared order
    assert_eq!(rows[20], vec!["word1", "1"]);
    assert_eq!(rows[21], vec!["word2", "1"]);
    assert_eq!(rows[22], vec!["word3", "1"]);
    assert_eq!(rows[23], vec!["word4", "0"]);
}

#[tokio::test]
async fn test_export_ingest_round_trip() {
    let (pool, registry, _dir) = setup().await;
    run_ingest(&pool, &registry, &sheet("42", "S01", "Alpha", 1))
        .await
        .unwrap();

    let originals = run_search_query(&pool, &[], "snapshots", true).await.unwrap();
    let csv_text = export_consolidated(&pool, &registry, originals.clone(), None)
        .await
        .unwrap();

    // Read the export back into a fresh database
    let second_pool = init_memory_database().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let paths = DataPaths::new(dir.path().to_path_buf());
    paths.ensure_dirs().unwrap();
    let second_registry = FormatRegistry::new(second_pool.clone(), &paths);
    let table = table_csv();
    second_registry
        .save_percentile_table("m_table", "Male norms", "m_table.csv", &table)
        .await
        .unwrap();
    second_registry
        .save_percentile_table("f_table", "Female norms", "f_table.csv", &table)
        .await
        .unwrap();
    second_registry
        .save_cdi_format("test_cdi", "Test CDI", "test_cdi.yaml", CHECKLIST_YAML)
        .await
        .unwrap();

    run_ingest(&second_pool, &second_registry, &csv_text)
        .await
        .unwrap();

    let round_tripped = run_search_query(&second_pool, &[], "snapshots", true)
        .await
        .unwrap();
    assert_eq!(round_tripped.len(), originals.len());

    let original = &originals[0];
    let copy = &round_tripped[0];
    assert_eq!(copy.child_id, original.child_id);
    assert_eq!(copy.study_id, original.study_id);
    assert_eq!(copy.study, original.study);
    assert_eq!(copy.gender, original.gender);
    assert_eq!(copy.age, original.age);
    assert_eq!(copy.birthday, original.birthday);
    assert_eq!(copy.session_date, original.session_date);
    assert_eq!(copy.session_num, original.session_num);
    assert_eq!(copy.words_spoken, original.words_spoken);
    assert_eq!(copy.percentile, original.percentile);
    assert_eq!(copy.languages, original.languages);
    assert_eq!(copy.cdi_type, original.cdi_type);
    assert_eq!(copy.hard_of_hearing, original.hard_of_hearing);
}

#[tokio::test]
async fn test_archive_groups_by_study_in_sorted_order() {
    let (pool, registry, _dir) = setup().await;
    run_ingest(&pool, &registry, &sheet("1", "S01", "Alpha", 1)).await.unwrap();
    run_ingest(&pool, &registry, &sheet("2", "S02", "Beta", 1)).await.unwrap();
    run_ingest(&pool, &registry, &sheet("3", "S03", "Alpha", 2)).await.unwrap();

    let snapshots = run_search_query(&pool, &[], "snapshots", true).await.unwrap();
    let bytes = export_archive(&pool, &registry, snapshots, None).await.unwrap();

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert_eq!(names, vec!["Alpha.csv", "Beta.csv"]);

    use std::io::Read;
    let mut alpha = String::new();
    archive.by_name("Alpha.csv").unwrap().read_to_string(&mut alpha).unwrap();
    // Two snapshot columns plus the label column
    let first_line = alpha.lines().next().unwrap();
    assert_eq!(first_line.split(',').count(), 3);

    let mut beta = String::new();
    archive.by_name("Beta.csv").unwrap().read_to_string(&mut beta).unwrap();
    assert_eq!(beta.lines().next().unwrap().split(',').count(), 2);
}

#[tokio::test]
async fn test_archive_export_is_deterministic() {
    let (pool, registry, _dir) = setup().await;
    run_ingest(&pool, &registry, &sheet("1", "S01", "Alpha", 1)).await.unwrap();
    run_ingest(&pool, &registry, &sheet("2", "S02", "Beta", 1)).await.unwrap();

    let snapshots = run_search_query(&pool, &[], "snapshots", true).await.unwrap();
    let first = export_archive(&pool, &registry, snapshots.clone(), None)
        .await
        .unwrap();
    let second = export_archive(&pool, &registry, snapshots, None).await.unwrap();
    assert_eq!(first, second);
}
