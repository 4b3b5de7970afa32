//! Integration tests for the ingest pipeline
//!
//! Each test runs against an in-memory database and a temp-dir registry
//! seeded with one four-word checklist format and a small percentile table.

use cdidb_common::config::DataPaths;
use cdidb_common::db::init_memory_database;
use cdidb_common::Error;
use cdidb_formats::FormatRegistry;
use cdidb_ingest::run_ingest;
use sqlx::SqlitePool;

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

/// Thresholds chosen so that 3+ spoken words clear the top row (rank 99)
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

fn sheet(overrides: &[(&str, &str)]) -> String {
    let mut rows = vec![
        ("child id", "42".to_string()),
        ("study id", "S01".to_string()),
        ("study", "Alpha".to_string()),
        ("gender", "m".to_string()),
        ("age", "24".to_string()),
        ("birthday", "2014/12/24".to_string()),
        ("session date", "2016/12/24".to_string()),
        ("session num", "1".to_string()),
        ("total num sessions", "1".to_string()),
        ("words spoken", "3".to_string()),
        ("items excluded", "0".to_string()),
        ("percentile", "99".to_string()),
        ("extra categories", "0".to_string()),
        ("revision", "0".to_string()),
        ("languages", "english".to_string()),
        ("num languages", "1".to_string()),
        ("cdi type", "test_cdi".to_string()),
        ("hard of hearing", "n".to_string()),
        ("deleted", "n".to_string()),
        ("word1", "1".to_string()),
        ("word2", "1".to_string()),
        ("word3", "1".to_string()),
        ("word4", "0".to_string()),
    ];
    for (label, value) in overrides {
        let row = rows
            .iter_mut()
            .find(|(l, _)| l == label)
            .unwrap_or_else(|| panic!("no row labeled '{}'", label));
        row.1 = value.to_string();
    }
    rows.iter()
        .map(|(label, value)| format!("{},{}", label, value))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn snapshot_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM snapshots")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_ingest_commits_one_snapshot() {
    let (pool, registry, _dir) = setup().await;

    let outcome = run_ingest(&pool, &registry, &sheet(&[])).await.unwrap();
    assert_eq!(outcome.snapshot_ids.len(), 1);

    let snapshot = cdidb_common::db::load_snapshot(&pool, outcome.snapshot_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.child_id.as_deref(), Some("42"));
    assert_eq!(snapshot.study, "Alpha");
    assert_eq!(snapshot.gender, cdidb_common::constants::MALE);
    assert_eq!(snapshot.age, 24.0);
    assert_eq!(snapshot.birthday, "2014/12/24");
    assert_eq!(snapshot.words_spoken, 3);
    assert_eq!(snapshot.percentile, 99.0);
    assert_eq!(snapshot.cdi_type, "test_cdi");

    let contents = cdidb_common::db::load_contents(&pool, outcome.snapshot_ids[0])
        .await
        .unwrap();
    assert_eq!(contents.len(), 4);
    assert!(contents.iter().any(|w| w.word == "word4" && w.value == 0));
}

#[tokio::test]
async fn test_deferred_fields_are_computed() {
    let (pool, registry, _dir) = setup().await;

    let text = sheet(&[
        ("age", ""),
        ("session num", ""),
        ("words spoken", ""),
        ("percentile", ""),
        ("num languages", ""),
    ]);
    let outcome = run_ingest(&pool, &registry, &text).await.unwrap();

    let snapshot = cdidb_common::db::load_snapshot(&pool, outcome.snapshot_ids[0])
        .await
        .unwrap()
        .unwrap();
    // 731 days / 30.42 days per month
    assert!((snapshot.age - 24.03).abs() < 0.01);
    assert_eq!(snapshot.session_num, 1);
    assert_eq!(snapshot.words_spoken, 3);
    assert_eq!(snapshot.percentile, 99.0);
    assert_eq!(snapshot.num_languages, 1);
}

#[tokio::test]
async fn test_deferred_session_num_counts_prior_sessions() {
    let (pool, registry, _dir) = setup().await;

    run_ingest(&pool, &registry, &sheet(&[])).await.unwrap();

    let second = sheet(&[("session num", ""), ("session date", "2017/01/24"), ("age", "")]);
    let outcome = run_ingest(&pool, &registry, &second).await.unwrap();

    let snapshot = cdidb_common::db::load_snapshot(&pool, outcome.snapshot_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.session_num, 2);
}

#[tokio::test]
async fn test_words_spoken_conflict_aborts_batch() {
    let (pool, registry, _dir) = setup().await;

    let result = run_ingest(&pool, &registry, &sheet(&[("words spoken", "4")])).await;
    match result {
        Err(Error::Ingest { column, message }) => {
            assert_eq!(column, 1);
            assert!(message.contains("num words"), "{}", message);
        }
        other => panic!("expected num words error, got {:?}", other.map(|o| o.snapshot_ids)),
    }
    assert_eq!(snapshot_count(&pool).await, 0);
}

#[tokio::test]
async fn test_age_conflict_beyond_tolerance_rejected() {
    let (pool, registry, _dir) = setup().await;

    // Computed age is ~24.03; 26 is more than a month off
    let result = run_ingest(&pool, &registry, &sheet(&[("age", "26")])).await;
    assert!(matches!(result, Err(Error::Ingest { column: 1, .. })));
    assert_eq!(snapshot_count(&pool).await, 0);

    // One month of drift is tolerated
    run_ingest(&pool, &registry, &sheet(&[("age", "25")])).await.unwrap();
    assert_eq!(snapshot_count(&pool).await, 1);
}

#[tokio::test]
async fn test_percentile_conflict_rejected() {
    let (pool, registry, _dir) = setup().await;

    let result = run_ingest(&pool, &registry, &sheet(&[("percentile", "50")])).await;
    match result {
        Err(Error::Ingest { column: 1, message }) => {
            assert!(message.contains("percentile"), "{}", message);
        }
        other => panic!("expected percentile error, got {:?}", other.map(|o| o.snapshot_ids)),
    }
}

#[tokio::test]
async fn test_session_date_before_birthday_rejected() {
    let (pool, registry, _dir) = setup().await;

    let result = run_ingest(
        &pool,
        &registry,
        &sheet(&[("session date", "2014/01/01"), ("age", "")]),
    )
    .await;
    assert!(matches!(result, Err(Error::Ingest { column: 1, .. })));
}

#[tokio::test]
async fn test_missing_child_id_gets_next_global_id() {
    let (pool, registry, _dir) = setup().await;

    run_ingest(&pool, &registry, &sheet(&[])).await.unwrap(); // child 42
    let outcome = run_ingest(&pool, &registry, &sheet(&[("child id", ""), ("study id", "S02")]))
        .await
        .unwrap();

    let snapshot = cdidb_common::db::load_snapshot(&pool, outcome.snapshot_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.child_id.as_deref(), Some("43"));
}

#[tokio::test]
async fn test_database_id_row_rereferences_existing_child() {
    let (pool, registry, _dir) = setup().await;

    let first = run_ingest(&pool, &registry, &sheet(&[])).await.unwrap();
    let existing_id = first.snapshot_ids[0];

    let mut text = sheet(&[
        ("child id", ""),
        ("session num", "2"),
        ("session date", "2017/01/24"),
        ("age", ""),
    ]);
    text = format!("database id,{}\n{}", existing_id, text);

    let outcome = run_ingest(&pool, &registry, &text).await.unwrap();
    let snapshot = cdidb_common::db::load_snapshot(&pool, outcome.snapshot_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.child_id.as_deref(), Some("42"));
}
