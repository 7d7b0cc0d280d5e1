//! Drives one source file through the import pipeline.
//!
//! ```text
//! INFER -> ENSURE_TABLE -> (READ_CHUNK -> SPLIT -> LOAD_VALID -> WRITE_REJECTS)* -> DONE
//!                  any error ------------------------------------------------> FAILED
//! ```
//!
//! A failed file reports zero accepted and zero rejected rows even when some
//! chunks were already committed; the committed counts are kept in the
//! failure message and the error log instead.

use std::{
    fmt,
    fs::{self, File},
    io::{BufReader, Read},
    path::{Path, PathBuf},
    sync::PoisonError,
};

use csv::ByteRecord;
use encoding_rs::Encoding;
use log::{error, info, trace, warn};
use serde::Serialize;

use crate::{
    context::RunContext,
    error::{EtlError, Result},
    io_utils,
    loader::BatchLoader,
    rejects::{RejectSink, reject_path_for},
    schema::infer_schema,
    validate::{RowVerdict, validate_row},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub file: String,
    pub table: String,
    pub accepted: usize,
    pub rejected: usize,
    pub failure: Option<String>,
}

impl ImportOutcome {
    pub fn failed(file: impl Into<String>, table: impl Into<String>, message: String) -> Self {
        Self {
            file: file.into(),
            table: table.into(),
            accepted: 0,
            rejected: 0,
            failure: Some(message),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Infer,
    EnsureTable,
    ReadChunk,
    Split,
    LoadValid,
    WriteRejects,
    Done,
    Failed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkerState::Infer => "INFER",
            WorkerState::EnsureTable => "ENSURE_TABLE",
            WorkerState::ReadChunk => "READ_CHUNK",
            WorkerState::Split => "SPLIT",
            WorkerState::LoadValid => "LOAD_VALID",
            WorkerState::WriteRejects => "WRITE_REJECTS",
            WorkerState::Done => "DONE",
            WorkerState::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Target table for a source file: `prefix` followed by the file stem.
pub fn table_name_for(source: &Path, prefix: &str) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{prefix}{stem}")
}

pub fn display_name(source: &Path) -> String {
    source
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string())
}

/// Yields successive chunks of decoded rows in source order.
struct ChunkReader<R: Read> {
    reader: csv::Reader<R>,
    record: ByteRecord,
    encoding: &'static Encoding,
    chunk_size: usize,
    path: PathBuf,
    line: u64,
    finished: bool,
}

impl<R: Read> ChunkReader<R> {
    fn read_chunk(&mut self) -> Result<Vec<Vec<String>>> {
        let mut chunk = Vec::with_capacity(self.chunk_size);
        while chunk.len() < self.chunk_size {
            let more = self
                .reader
                .read_byte_record(&mut self.record)
                .map_err(|source| EtlError::Read {
                    path: self.path.clone(),
                    row: self.line + 1,
                    source,
                })?;
            if !more {
                self.finished = true;
                break;
            }
            self.line += 1;
            let decoded = io_utils::decode_record(&self.record, self.encoding).ok_or_else(|| {
                EtlError::Decode {
                    path: self.path.clone(),
                    row: self.line,
                    encoding: self.encoding.name(),
                }
            })?;
            chunk.push(decoded);
        }
        Ok(chunk)
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Result<Vec<Vec<String>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_chunk() {
            Ok(chunk) if chunk.is_empty() => None,
            Ok(chunk) => Some(Ok(chunk)),
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    chunks: usize,
    accepted: usize,
    rejected: usize,
}

pub struct FileImportWorker<'a> {
    ctx: &'a RunContext,
    source: PathBuf,
    file: String,
    table: String,
    state: WorkerState,
    progress: Progress,
}

impl<'a> FileImportWorker<'a> {
    pub fn new(ctx: &'a RunContext, source: &Path) -> Self {
        Self {
            ctx,
            source: source.to_path_buf(),
            file: display_name(source),
            table: table_name_for(source, &ctx.config().import.table_prefix),
            state: WorkerState::Infer,
            progress: Progress::default(),
        }
    }

    pub fn run(mut self) -> ImportOutcome {
        match self.process() {
            Ok(()) => {
                self.state = WorkerState::Done;
                info!(
                    "Completed processing {}: {} successful, {} rejected",
                    self.file, self.progress.accepted, self.progress.rejected
                );
                if self.ctx.config().import.move_processed {
                    self.archive_source();
                }
                ImportOutcome {
                    file: self.file,
                    table: self.table,
                    accepted: self.progress.accepted,
                    rejected: self.progress.rejected,
                    failure: None,
                }
            }
            Err(err) => {
                let failed_in = self.state;
                self.state = WorkerState::Failed;
                let Progress {
                    chunks,
                    accepted,
                    rejected,
                } = self.progress;
                let message = if chunks > 0 {
                    format!(
                        "{failed_in}: {err} (after {chunks} chunk(s): {accepted} loaded, {rejected} rejected)"
                    )
                } else {
                    format!("{failed_in}: {err}")
                };
                error!("Error processing {}: {message}", self.file);
                ImportOutcome::failed(self.file, self.table, message)
            }
        }
    }

    fn process(&mut self) -> Result<()> {
        let ctx = self.ctx;
        let import = &ctx.config().import;
        let delimiter = ctx.delimiter();
        let encoding = ctx.encoding();

        self.state = WorkerState::Infer;
        let schema = infer_schema(
            &self.source,
            delimiter,
            encoding,
            import.sample_rows,
            import.max_text_length,
        )?;
        if schema.is_empty() {
            return Err(EtlError::EmptyHeader(self.source.clone()));
        }

        let table_lock = ctx.table_lock(&self.table);
        let _table_guard = table_lock
            .as_ref()
            .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner));

        self.state = WorkerState::EnsureTable;
        let loader = BatchLoader::new(ctx.storage(), import.fast_bulk_insert);
        loader.ensure_table(&self.table, &schema)?;

        self.state = WorkerState::ReadChunk;
        let mut reader = io_utils::open_csv_reader_from_path(&self.source, delimiter)?;
        let raw_headers =
            io_utils::reader_headers(&mut reader, encoding).map_err(|source| EtlError::Read {
                path: self.source.clone(),
                row: 1,
                source,
            })?;
        let columns = schema.headers();
        let expected_columns = schema.len();
        let mut rejects = RejectSink::new(
            reject_path_for(&import.rejects_folder, &self.source),
            raw_headers,
            delimiter,
        );
        let chunks: ChunkReader<BufReader<File>> = ChunkReader {
            reader,
            record: ByteRecord::new(),
            encoding,
            chunk_size: import.batch_size,
            path: self.source.clone(),
            line: 1,
            finished: false,
        };

        for chunk in chunks {
            let chunk = chunk?;

            self.state = WorkerState::Split;
            let mut valid = Vec::with_capacity(chunk.len());
            let mut invalid = Vec::new();
            for row in chunk {
                match validate_row(row, expected_columns, &schema) {
                    RowVerdict::Accepted(values) => valid.push(values),
                    RowVerdict::Rejected { row, reason } => {
                        trace!("Rejected row in {}: {reason}", self.file);
                        invalid.push(row);
                    }
                }
            }

            self.state = WorkerState::LoadValid;
            self.progress.accepted += loader.insert_batch(&self.table, &columns, &valid);

            self.state = WorkerState::WriteRejects;
            rejects.append(&invalid)?;
            self.progress.rejected += invalid.len();

            self.progress.chunks += 1;
            info!(
                "Processed chunk {} for {}: {} valid, {} invalid",
                self.progress.chunks,
                self.file,
                valid.len(),
                invalid.len()
            );
            self.state = WorkerState::ReadChunk;
        }
        Ok(())
    }

    fn archive_source(&self) {
        let folder = &self.ctx.config().import.processed_folder;
        let stamp = self.ctx.started_at().format("%Y%m%d_%H%M%S");
        let stem = self
            .source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = self
            .source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let target = folder.join(format!("{stem}_{stamp}{extension}"));
        let moved = fs::create_dir_all(folder).and_then(|()| fs::rename(&self.source, &target));
        match moved {
            Ok(()) => info!("Moved {} to {:?}", self.file, target),
            Err(err) => warn!("Could not move {} to {:?}: {err}", self.file, target),
        }
    }
}
