//! YAML run configuration.
//!
//! Every section and field has a default, so a partial file (or none at all)
//! yields a usable configuration. The loaded value is frozen inside the
//! [`crate::context::RunContext`] for the lifetime of one run.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    cli::parse_delimiter,
    error::{EtlError, Result},
};

pub const DEFAULT_CONFIG_PATH: &str = "csv-etl.yml";
pub const DEFAULT_TABLE_PREFIX: &str = "EXPORT_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub database: DatabaseConfig,
    pub import: ImportConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("etl.db"),
            busy_timeout_ms: 30_000,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub input_folder: PathBuf,
    pub processed_folder: PathBuf,
    pub rejects_folder: PathBuf,
    /// Data rows sampled for inference; 0 scans the whole file.
    pub sample_rows: usize,
    pub batch_size: usize,
    pub max_text_length: usize,
    /// Multi-row INSERT statements instead of one statement per row.
    pub fast_bulk_insert: bool,
    pub delimiter: String,
    pub input_encoding: Option<String>,
    pub table_prefix: String,
    /// Concurrent file workers; unset runs one worker per file.
    pub max_workers: Option<usize>,
    /// Serialise files that target the same table.
    pub lock_tables: bool,
    /// Remove stale `<stem>_rejects.csv` files before a run.
    pub clear_rejects: bool,
    /// Archive each fully processed file into `processed_folder`.
    pub move_processed: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::from("input"),
            processed_folder: PathBuf::from("input/processed"),
            rejects_folder: PathBuf::from("rejects"),
            sample_rows: 100,
            batch_size: 1000,
            max_text_length: 255,
            fast_bulk_insert: true,
            delimiter: ",".to_string(),
            input_encoding: None,
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            max_workers: None,
            lock_tables: false,
            clear_rejects: false,
            move_processed: false,
        }
    }
}

impl ImportConfig {
    pub fn delimiter_byte(&self) -> Result<u8> {
        parse_delimiter(&self.delimiter).map_err(EtlError::Config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub export_folder: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_folder: PathBuf::from("export"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log records are also appended here when set.
    pub file: Option<PathBuf>,
}

impl EtlConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| EtlError::io(path, err))?;
        let config: EtlConfig = serde_yaml::from_str(&raw)
            .map_err(|err| EtlError::Config(format!("Parsing {path:?}: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, or writes the defaults there (and creates the working
    /// folders) when it does not exist yet.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let config = EtlConfig::default();
        config.write_default(path)?;
        Ok(config)
    }

    pub fn write_default(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|err| EtlError::Config(format!("Serialising configuration: {err}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| EtlError::io(parent, err))?;
        }
        fs::write(path, yaml).map_err(|err| EtlError::io(path, err))?;
        self.create_folders()?;
        info!("Wrote default configuration to {path:?}");
        Ok(())
    }

    pub fn create_folders(&self) -> Result<()> {
        for folder in [
            &self.import.input_folder,
            &self.import.processed_folder,
            &self.import.rejects_folder,
            &self.export.export_folder,
        ] {
            fs::create_dir_all(folder).map_err(|err| EtlError::io(folder, err))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.import.batch_size == 0 {
            return Err(EtlError::Config("import.batch_size must be positive".into()));
        }
        if self.import.max_text_length == 0 {
            return Err(EtlError::Config(
                "import.max_text_length must be positive".into(),
            ));
        }
        if self.import.max_workers == Some(0) {
            return Err(EtlError::Config(
                "import.max_workers must be positive when set".into(),
            ));
        }
        self.import.delimiter_byte()?;
        Ok(())
    }
}
