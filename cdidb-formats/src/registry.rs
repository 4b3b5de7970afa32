//! Cached format registry
//!
//! Resolves safe_names to checklist formats, percentile tables and
//! presentation formats. Metadata rows live in the database; bodies live on
//! the filesystem. Loaded values are memoized per process behind the
//! registry object; save and delete invalidate the affected entry.

use crate::loader::{build_percentile_table, parse_checklist_yaml, parse_presentation_yaml};
use crate::model::{ChecklistFormat, FormatMetadataRow, PercentileTable, PresentationFormat};
use cdidb_common::config::DataPaths;
use cdidb_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

const CDI_FORMATS_TABLE: &str = "cdi_formats";
const PERCENTILE_TABLES_TABLE: &str = "percentile_tables";
const PRESENTATION_FORMATS_TABLE: &str = "presentation_formats";

/// Registry over the three format kinds, with per-process caches.
///
/// Cache lifetime is tied to this object; construct one per process and pass
/// it down explicitly.
pub struct FormatRegistry {
    pool: SqlitePool,
    formats_dir: PathBuf,
    percentiles_dir: PathBuf,
    presentations_dir: PathBuf,
    checklist_cache: RwLock<HashMap<String, Arc<ChecklistFormat>>>,
    table_cache: RwLock<HashMap<String, Arc<PercentileTable>>>,
    presentation_cache: RwLock<HashMap<String, Arc<PresentationFormat>>>,
}

impl FormatRegistry {
    pub fn new(pool: SqlitePool, paths: &DataPaths) -> Self {
        Self {
            pool,
            formats_dir: paths.formats_dir.clone(),
            percentiles_dir: paths.percentiles_dir.clone(),
            presentations_dir: paths.presentations_dir.clone(),
            checklist_cache: RwLock::new(HashMap::new()),
            table_cache: RwLock::new(HashMap::new()),
            presentation_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every cached entry. Test seam; also useful after bulk admin
    /// edits outside this process.
    pub fn clear_caches(&self) {
        self.checklist_cache.write().unwrap().clear();
        self.table_cache.write().unwrap().clear();
        self.presentation_cache.write().unwrap().clear();
    }

    // ---- checklist formats ----

    /// Resolve a checklist format by safe_name
    pub async fn load_cdi_format(&self, safe_name: &str) -> Result<Option<Arc<ChecklistFormat>>> {
        if let Some(cached) = self.checklist_cache.read().unwrap().get(safe_name) {
            return Ok(Some(cached.clone()));
        }

        let Some(row) = self.metadata_row(CDI_FORMATS_TABLE, safe_name).await? else {
            return Ok(None);
        };

        let body = read_body(&self.formats_dir, &row.filename)?;
        let format = ChecklistFormat {
            safe_name: row.safe_name,
            human_name: row.human_name,
            filename: row.filename,
            details: parse_checklist_yaml(&body)?,
        };
        format.validate()?;

        let format = Arc::new(format);
        self.checklist_cache
            .write()
            .unwrap()
            .insert(safe_name.to_string(), format.clone());
        debug!("Cached checklist format '{}'", safe_name);
        Ok(Some(format))
    }

    pub async fn list_cdi_formats(&self) -> Result<Vec<FormatMetadataRow>> {
        self.list_rows(CDI_FORMATS_TABLE).await
    }

    /// Validate and store a checklist format: body file plus metadata row.
    ///
    /// Every percentile reference must resolve to a known percentile table.
    pub async fn save_cdi_format(
        &self,
        safe_name: &str,
        human_name: &str,
        filename: &str,
        body: &str,
    ) -> Result<()> {
        let details = parse_checklist_yaml(body)?;
        let format = ChecklistFormat {
            safe_name: safe_name.to_string(),
            human_name: human_name.to_string(),
            filename: filename.to_string(),
            details,
        };
        format.validate()?;

        let refs: HashSet<&str> = [
            format.details.percentiles.male.as_str(),
            format.details.percentiles.female.as_str(),
            format.details.percentiles.other.as_str(),
        ]
        .into_iter()
        .collect();
        for table_name in refs {
            if self
                .metadata_row(PERCENTILE_TABLES_TABLE, table_name)
                .await?
                .is_none()
            {
                return Err(Error::FormatDefinition(format!(
                    "format '{}' references unknown percentile table '{}'",
                    safe_name, table_name
                )));
            }
        }

        write_body(&self.formats_dir, filename, body)?;
        self.upsert_row(CDI_FORMATS_TABLE, safe_name, human_name, filename)
            .await?;
        self.checklist_cache.write().unwrap().remove(safe_name);
        info!("Saved checklist format '{}'", safe_name);
        Ok(())
    }

    pub async fn delete_cdi_format(&self, safe_name: &str) -> Result<()> {
        self.delete_entry(CDI_FORMATS_TABLE, &self.formats_dir, safe_name)
            .await?;
        self.checklist_cache.write().unwrap().remove(safe_name);
        Ok(())
    }

    /// Every stored checklist format, keyed by safe_name. Ingest prefetches
    /// this so the automaton can stay synchronous.
    pub async fn all_cdi_formats(&self) -> Result<HashMap<String, Arc<ChecklistFormat>>> {
        let mut formats = HashMap::new();
        for row in self.list_cdi_formats().await? {
            if let Some(format) = self.load_cdi_format(&row.safe_name).await? {
                formats.insert(row.safe_name, format);
            }
        }
        Ok(formats)
    }

    // ---- percentile tables ----

    pub async fn load_percentile_table(
        &self,
        safe_name: &str,
    ) -> Result<Option<Arc<PercentileTable>>> {
        if let Some(cached) = self.table_cache.read().unwrap().get(safe_name) {
            return Ok(Some(cached.clone()));
        }

        let Some(row) = self.metadata_row(PERCENTILE_TABLES_TABLE, safe_name).await? else {
            return Ok(None);
        };

        let body = read_body(&self.percentiles_dir, &row.filename)?;
        let table = build_percentile_table(&row.safe_name, &row.human_name, &row.filename, &body)?;

        let table = Arc::new(table);
        self.table_cache
            .write()
            .unwrap()
            .insert(safe_name.to_string(), table.clone());
        Ok(Some(table))
    }

    pub async fn list_percentile_tables(&self) -> Result<Vec<FormatMetadataRow>> {
        self.list_rows(PERCENTILE_TABLES_TABLE).await
    }

    pub async fn save_percentile_table(
        &self,
        safe_name: &str,
        human_name: &str,
        filename: &str,
        body: &str,
    ) -> Result<()> {
        // Parse/validate before anything is written
        build_percentile_table(safe_name, human_name, filename, body)?;

        write_body(&self.percentiles_dir, filename, body)?;
        self.upsert_row(PERCENTILE_TABLES_TABLE, safe_name, human_name, filename)
            .await?;
        self.table_cache.write().unwrap().remove(safe_name);
        info!("Saved percentile table '{}'", safe_name);
        Ok(())
    }

    pub async fn delete_percentile_table(&self, safe_name: &str) -> Result<()> {
        self.delete_entry(PERCENTILE_TABLES_TABLE, &self.percentiles_dir, safe_name)
            .await?;
        self.table_cache.write().unwrap().remove(safe_name);
        Ok(())
    }

    // ---- presentation formats ----

    pub async fn load_presentation_format(
        &self,
        safe_name: &str,
    ) -> Result<Option<Arc<PresentationFormat>>> {
        if let Some(cached) = self.presentation_cache.read().unwrap().get(safe_name) {
            return Ok(Some(cached.clone()));
        }

        let Some(row) = self
            .metadata_row(PRESENTATION_FORMATS_TABLE, safe_name)
            .await?
        else {
            return Ok(None);
        };

        let body = read_body(&self.presentations_dir, &row.filename)?;
        let presentation = PresentationFormat {
            safe_name: row.safe_name,
            human_name: row.human_name,
            filename: row.filename,
            details: parse_presentation_yaml(&body)?,
        };

        let presentation = Arc::new(presentation);
        self.presentation_cache
            .write()
            .unwrap()
            .insert(safe_name.to_string(), presentation.clone());
        Ok(Some(presentation))
    }

    pub async fn list_presentation_formats(&self) -> Result<Vec<FormatMetadataRow>> {
        self.list_rows(PRESENTATION_FORMATS_TABLE).await
    }

    pub async fn save_presentation_format(
        &self,
        safe_name: &str,
        human_name: &str,
        filename: &str,
        body: &str,
    ) -> Result<()> {
        parse_presentation_yaml(body)?;

        write_body(&self.presentations_dir, filename, body)?;
        self.upsert_row(PRESENTATION_FORMATS_TABLE, safe_name, human_name, filename)
            .await?;
        self.presentation_cache.write().unwrap().remove(safe_name);
        info!("Saved presentation format '{}'", safe_name);
        Ok(())
    }

    pub async fn delete_presentation_format(&self, safe_name: &str) -> Result<()> {
        self.delete_entry(PRESENTATION_FORMATS_TABLE, &self.presentations_dir, safe_name)
            .await?;
        self.presentation_cache.write().unwrap().remove(safe_name);
        Ok(())
    }

    // ---- derived queries ----

    /// Total word count of a checklist format
    pub async fn max_words(&self, safe_name: &str) -> Result<i64> {
        let format = self
            .load_cdi_format(safe_name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("checklist format '{}'", safe_name)))?;
        Ok(format.max_words())
    }

    /// Count-as-spoken code set of a checklist format
    pub async fn count_as_spoken(&self, safe_name: &str) -> Result<HashSet<i64>> {
        let format = self
            .load_cdi_format(safe_name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("checklist format '{}'", safe_name)))?;
        Ok(format.count_as_spoken())
    }

    /// Percentile table referenced by a format for the given gender sentinel
    pub async fn percentile_table_for(
        &self,
        format: &ChecklistFormat,
        gender: i64,
    ) -> Result<Arc<PercentileTable>> {
        let table_name = format.percentile_table_name(gender);
        self.load_percentile_table(table_name).await?.ok_or_else(|| {
            Error::NotFound(format!(
                "percentile table '{}' referenced by format '{}'",
                table_name, format.safe_name
            ))
        })
    }

    // ---- shared row plumbing ----

    async fn metadata_row(&self, table: &str, safe_name: &str) -> Result<Option<FormatMetadataRow>> {
        let sql = format!(
            "SELECT safe_name, human_name, filename FROM {} WHERE safe_name = ?",
            table
        );
        let row = sqlx::query(&sql)
            .bind(safe_name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| FormatMetadataRow {
            safe_name: row.get("safe_name"),
            human_name: row.get("human_name"),
            filename: row.get("filename"),
        }))
    }

    async fn list_rows(&self, table: &str) -> Result<Vec<FormatMetadataRow>> {
        let sql = format!(
            "SELECT safe_name, human_name, filename FROM {} ORDER BY safe_name",
            table
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| FormatMetadataRow {
                safe_name: row.get("safe_name"),
                human_name: row.get("human_name"),
                filename: row.get("filename"),
            })
            .collect())
    }

    async fn upsert_row(
        &self,
        table: &str,
        safe_name: &str,
        human_name: &str,
        filename: &str,
    ) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (safe_name, human_name, filename)
            VALUES (?, ?, ?)
            ON CONFLICT(safe_name) DO UPDATE SET
                human_name = excluded.human_name,
                filename = excluded.filename
            "#,
            table
        );
        sqlx::query(&sql)
            .bind(safe_name)
            .bind(human_name)
            .bind(filename)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_entry(&self, table: &str, dir: &Path, safe_name: &str) -> Result<()> {
        if let Some(row) = self.metadata_row(table, safe_name).await? {
            let path = dir.join(&row.filename);
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }

        let sql = format!("DELETE FROM {} WHERE safe_name = ?", table);
        sqlx::query(&sql)
            .bind(safe_name)
            .execute(&self.pool)
            .await?;
        info!("Deleted format entry '{}' from {}", safe_name, table);
        Ok(())
    }
}

fn read_body(dir: &Path, filename: &str) -> Result<String> {
    let path = dir.join(filename);
    std::fs::read_to_string(&path)
        .map_err(|e| Error::NotFound(format!("{}: {}", path.display(), e)))
}

fn write_body(dir: &Path, filename: &str, body: &str) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(filename), body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdidb_common::db::init_memory_database;

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

    const TABLE_CSV: &str = "month,16,17,18\n99,10,20,30\n50,5,10,15\n";

    async fn setup() -> (FormatRegistry, tempfile::TempDir) {
        let pool = init_memory_database().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        (FormatRegistry::new(pool, &paths), dir)
    }

    async fn seed_tables(registry: &FormatRegistry) {
        registry
            .save_percentile_table("m_table", "Male table", "m_table.csv", TABLE_CSV)
            .await
            .unwrap();
        registry
            .save_percentile_table("f_table", "Female table", "f_table.csv", TABLE_CSV)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_save_and_load_checklist_format() {
        let (registry, _dir) = setup().await;
        seed_tables(&registry).await;

        registry
            .save_cdi_format("test_cdi", "Test CDI", "test_cdi.yaml", CHECKLIST_YAML)
            .await
            .unwrap();

        let format = registry.load_cdi_format("test_cdi").await.unwrap().unwrap();
        assert_eq!(format.human_name, "Test CDI");
        assert_eq!(format.max_words(), 4);
        assert_eq!(registry.max_words("test_cdi").await.unwrap(), 4);
        assert!(registry.count_as_spoken("test_cdi").await.unwrap().contains(&1));
    }

    #[tokio::test]
    async fn test_unknown_format_is_none() {
        let (registry, _dir) = setup().await;
        assert!(registry.load_cdi_format("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_rejects_unresolved_percentile_ref() {
        let (registry, _dir) = setup().await;
        // No percentile tables stored yet
        let result = registry
            .save_cdi_format("test_cdi", "Test CDI", "test_cdi.yaml", CHECKLIST_YAML)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cache_hit_and_invalidation_on_save() {
        let (registry, dir) = setup().await;
        seed_tables(&registry).await;
        registry
            .save_cdi_format("test_cdi", "Test CDI", "test_cdi.yaml", CHECKLIST_YAML)
            .await
            .unwrap();
        registry.load_cdi_format("test_cdi").await.unwrap().unwrap();

        // Mutating the file behind the cache is invisible until invalidation
        let body_path = dir.path().join("formats").join("test_cdi.yaml");
        std::fs::write(&body_path, CHECKLIST_YAML.replace("Test", "Changed")).unwrap();
        let cached = registry.load_cdi_format("test_cdi").await.unwrap().unwrap();
        assert_eq!(cached.details.meta.cdi_type, "test_cdi");

        // Saving again re-reads the body
        let renamed = CHECKLIST_YAML.replace("test_cdi", "renamed_type");
        registry
            .save_cdi_format("test_cdi", "Test CDI", "test_cdi.yaml", &renamed)
            .await
            .unwrap();
        let reloaded = registry.load_cdi_format("test_cdi").await.unwrap().unwrap();
        assert_eq!(reloaded.details.meta.cdi_type, "renamed_type");
    }

    #[tokio::test]
    async fn test_delete_removes_row_file_and_cache() {
        let (registry, dir) = setup().await;
        seed_tables(&registry).await;
        registry
            .save_cdi_format("test_cdi", "Test CDI", "test_cdi.yaml", CHECKLIST_YAML)
            .await
            .unwrap();
        registry.load_cdi_format("test_cdi").await.unwrap().unwrap();

        registry.delete_cdi_format("test_cdi").await.unwrap();
        assert!(registry.load_cdi_format("test_cdi").await.unwrap().is_none());
        assert!(!dir.path().join("formats").join("test_cdi.yaml").exists());
    }

    #[tokio::test]
    async fn test_percentile_table_for_gender() {
        let (registry, _dir) = setup().await;
        seed_tables(&registry).await;
        registry
            .save_cdi_format("test_cdi", "Test CDI", "test_cdi.yaml", CHECKLIST_YAML)
            .await
            .unwrap();
        let format = registry.load_cdi_format("test_cdi").await.unwrap().unwrap();

        let male = registry
            .percentile_table_for(&format, cdidb_common::constants::MALE)
            .await
            .unwrap();
        assert_eq!(male.safe_name, "m_table");

        let other = registry
            .percentile_table_for(&format, cdidb_common::constants::OTHER_GENDER)
            .await
            .unwrap();
        assert_eq!(other.safe_name, "f_table");
    }

    #[tokio::test]
    async fn test_clear_caches_seam() {
        let (registry, dir) = setup().await;
        seed_tables(&registry).await;
        registry
            .save_cdi_format("test_cdi", "Test CDI", "test_cdi.yaml", CHECKLIST_YAML)
            .await
            .unwrap();
        registry.load_cdi_format("test_cdi").await.unwrap().unwrap();

        let body_path = dir.path().join("formats").join("test_cdi.yaml");
        std::fs::write(&body_path, CHECKLIST_YAML.replace("test_cdi", "edited")).unwrap();

        registry.clear_caches();
        let reloaded = registry.load_cdi_format("test_cdi").await.unwrap().unwrap();
        assert_eq!(reloaded.details.meta.cdi_type, "edited");
    }
}
