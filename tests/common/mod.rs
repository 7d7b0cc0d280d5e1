#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use csv_etl::config::EtlConfig;
use csv_etl::context::RunContext;
use csv_etl::data::Value;
use csv_etl::storage::{SqliteStore, Storage, quote_identifier};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent folders");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    /// Default configuration with every folder and the database rooted here.
    pub fn config(&self) -> EtlConfig {
        let root = self.path();
        let mut config = EtlConfig::default();
        config.database.path = root.join("etl.db");
        config.import.input_folder = root.join("input");
        config.import.processed_folder = root.join("input").join("processed");
        config.import.rejects_folder = root.join("rejects");
        config.export.export_folder = root.join("export");
        config.create_folders().expect("create folders");
        config
    }

    /// Writes `config` as YAML under the workspace and returns its path.
    pub fn write_config(&self, config: &EtlConfig) -> PathBuf {
        let path = self.path().join("csv-etl.yml");
        fs::write(&path, serde_yaml::to_string(config).expect("serialise config"))
            .expect("write config");
        path
    }

    pub fn context(&self, config: EtlConfig) -> RunContext {
        let store = SqliteStore::open(&config.database.path, config.database.busy_timeout())
            .expect("open store");
        RunContext::new(config, Box::new(store)).expect("run context")
    }

    pub fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).expect("read file")
    }
}

pub fn row_count(storage: &dyn Storage, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
    let result = storage
        .execute_query(&sql, &[])
        .expect("count query")
        .expect("count rows");
    match result.rows[0][0] {
        Value::Integer(count) => count,
        ref other => panic!("unexpected count {other:?}"),
    }
}

pub fn table_ddl(storage: &dyn Storage, table: &str) -> String {
    let result = storage
        .execute_query(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[Value::Text(table.to_string())],
        )
        .expect("ddl query")
        .expect("ddl rows");
    result.rows[0][0].as_display()
}
