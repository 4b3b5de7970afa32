//! Configuration loading and data root resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Environment variable naming the data root
pub const DATA_ROOT_ENV: &str = "CDIDB_ROOT";

/// Resolved locations of everything cdidb keeps on disk
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    pub database_file: PathBuf,
    pub formats_dir: PathBuf,
    pub percentiles_dir: PathBuf,
    pub presentations_dir: PathBuf,
}

impl DataPaths {
    pub fn new(root: PathBuf) -> Self {
        Self {
            database_file: root.join("cdidb.db"),
            formats_dir: root.join("formats"),
            percentiles_dir: root.join("percentiles"),
            presentations_dir: root.join("presentations"),
            root,
        }
    }

    /// Create the body directories if they do not exist yet.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.formats_dir)?;
        std::fs::create_dir_all(&self.percentiles_dir)?;
        std::fs::create_dir_all(&self.presentations_dir)?;
        Ok(())
    }
}

/// Data root resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`root_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_root(cli_arg: Option<&str>, config_file: Option<&str>) -> Result<DataPaths> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(DataPaths::new(PathBuf::from(path)));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATA_ROOT_ENV) {
        return Ok(DataPaths::new(PathBuf::from(path)));
    }

    // Priority 3: TOML config file
    let config_path = match config_file {
        Some(explicit) => Some(PathBuf::from(explicit)),
        None => default_config_file(),
    };
    if let Some(config_path) = config_path {
        if config_path.exists() {
            let toml_content = std::fs::read_to_string(&config_path)?;
            let config: toml::Value = toml::from_str(&toml_content)
                .map_err(|e| Error::Config(format!("{}: {}", config_path.display(), e)))?;
            if let Some(root) = config.get("root_folder").and_then(|v| v.as_str()) {
                return Ok(DataPaths::new(PathBuf::from(root)));
            }
        } else if config_file.is_some() {
            // An explicitly requested config file must exist
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(DataPaths::new(default_data_root()))
}

/// Default configuration file path for the platform
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cdidb").join("config.toml"))
}

/// OS-dependent default data root
fn default_data_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("cdidb"))
        .unwrap_or_else(|| PathBuf::from("./cdidb_data"))
}
