//! Error taxonomy for the import and export pipelines.
//!
//! Row-level validation failures are not errors: they are routed to the reject
//! stream by [`crate::validate`]. Everything here aborts the unit of work it
//! occurs in (one batch, one file, or one table) and never crosses into a
//! sibling worker.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::StorageError;

pub type Result<T, E = EtlError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Reading sample from {path:?}: {source}")]
    SampleRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Reading {path:?} at row {row}: {source}")]
    Read {
        path: PathBuf,
        row: u64,
        #[source]
        source: csv::Error,
    },

    #[error("Decoding row {row} of {path:?} as {encoding}")]
    Decode {
        path: PathBuf,
        row: u64,
        encoding: &'static str,
    },

    #[error("File {0:?} has no header fields")]
    EmptyHeader(PathBuf),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Batch insert into '{table}' failed: {source}")]
    BatchWrite {
        table: String,
        #[source]
        source: StorageError,
    },

    #[error("Writing rejects to {path:?}: {source}")]
    RejectWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Exporting table '{table}': {message}")]
    Export { table: String, message: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker for {0} panicked")]
    WorkerPanicked(String),
}

impl EtlError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EtlError::Io {
            path: path.into(),
            source,
        }
    }
}
