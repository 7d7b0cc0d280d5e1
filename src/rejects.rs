//! Side channel for rows that fail validation.
//!
//! One reject file per source file. The first write of a run truncates the
//! file and writes the header; later writes append rows only. Whether the
//! header has been written is tracked by the caller's [`RejectSink`], never
//! inferred from what is already on disk.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    error::{EtlError, Result},
    io_utils,
};

pub fn reject_path_for(rejects_folder: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    rejects_folder.join(format!("{stem}_rejects.csv"))
}

/// Writes `rows` to `path`, creating parent folders. `is_first_write`
/// truncates and emits `columns` as the header line.
pub fn append_rejects(
    path: &Path,
    columns: &[String],
    rows: &[Vec<String>],
    is_first_write: bool,
    delimiter: u8,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| EtlError::io(parent, err))?;
    }
    let write_error = |source: csv::Error| EtlError::RejectWrite {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = io_utils::open_csv_writer(path, delimiter, !is_first_write)?;
    if is_first_write {
        writer.write_record(columns).map_err(write_error)?;
    }
    for row in rows {
        writer.write_record(row).map_err(write_error)?;
    }
    io_utils::flush_writer(&mut writer, path)
}

#[derive(Debug)]
pub struct RejectSink {
    path: PathBuf,
    columns: Vec<String>,
    delimiter: u8,
    header_written: bool,
    rows_written: usize,
}

impl RejectSink {
    pub fn new(path: PathBuf, columns: Vec<String>, delimiter: u8) -> Self {
        Self {
            path,
            columns,
            delimiter,
            header_written: false,
            rows_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn append(&mut self, rows: &[Vec<String>]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        append_rejects(
            &self.path,
            &self.columns,
            rows,
            !self.header_written,
            self.delimiter,
        )?;
        self.header_written = true;
        self.rows_written += rows.len();
        debug!("Wrote {} reject(s) to {:?}", rows.len(), self.path);
        Ok(())
    }
}
