//! Per-run state shared read-only by every worker of one import or export.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Local};
use encoding_rs::Encoding;

use crate::{
    config::EtlConfig,
    error::Result,
    io_utils,
    storage::Storage,
};

/// Name-keyed mutexes serialising workers that write the same table.
#[derive(Debug, Default)]
pub struct TableLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TableLocks {
    pub fn handle(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(table.to_lowercase())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct RunContext {
    config: EtlConfig,
    storage: Box<dyn Storage>,
    delimiter: u8,
    encoding: &'static Encoding,
    table_locks: Option<TableLocks>,
    started_at: DateTime<Local>,
}

impl RunContext {
    pub fn new(config: EtlConfig, storage: Box<dyn Storage>) -> Result<Self> {
        config.validate()?;
        let delimiter = config.import.delimiter_byte()?;
        let encoding = io_utils::resolve_encoding(config.import.input_encoding.as_deref())?;
        let table_locks = config.import.lock_tables.then(TableLocks::default);
        Ok(Self {
            config,
            storage,
            delimiter,
            encoding,
            table_locks,
            started_at: Local::now(),
        })
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Lock handle for `table` when table locking is enabled.
    pub fn table_lock(&self, table: &str) -> Option<Arc<Mutex<()>>> {
        self.table_locks.as_ref().map(|locks| locks.handle(table))
    }
}
