use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{error, info, warn};
use serde::Serialize;

use crate::{
    context::RunContext,
    error::{EtlError, Result},
    parallel,
    rejects::reject_path_for,
    worker::{FileImportWorker, ImportOutcome, display_name, table_name_for},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub outcomes: Vec<ImportOutcome>,
    pub total_accepted: usize,
    pub total_rejected: usize,
    pub failed_files: usize,
}

impl ImportSummary {
    /// Sums the counts of every file that completed; failed files are
    /// counted separately and contribute nothing to the totals.
    pub fn from_outcomes(outcomes: Vec<ImportOutcome>) -> Self {
        let mut summary = ImportSummary::default();
        for outcome in &outcomes {
            if outcome.is_failed() {
                summary.failed_files += 1;
            } else {
                summary.total_accepted += outcome.accepted;
                summary.total_rejected += outcome.rejected;
            }
        }
        summary.outcomes = outcomes;
        summary
    }
}

/// CSV files directly under `folder`, sorted by name. Subfolders are ignored.
pub fn discover_csv_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(folder).map_err(|err| EtlError::io(folder, err))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| EtlError::io(folder, err))?.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn clear_stale_rejects(rejects_folder: &Path, files: &[PathBuf]) {
    for file in files {
        let path = reject_path_for(rejects_folder, file);
        match fs::remove_file(&path) {
            Ok(()) => info!("Removed stale reject file {path:?}"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("Could not remove stale reject file {path:?}: {err}"),
        }
    }
}

/// Imports every CSV file in `input_folder`, one isolated worker per file.
pub fn run_import(ctx: &RunContext, input_folder: &Path) -> Result<ImportSummary> {
    let import = &ctx.config().import;
    let files = discover_csv_files(input_folder)?;
    if files.is_empty() {
        info!("No CSV files found in {input_folder:?}");
        return Ok(ImportSummary::default());
    }
    info!("Found {} CSV file(s) to process", files.len());

    if import.clear_rejects {
        clear_stale_rejects(&import.rejects_folder, &files);
    }

    let outcomes = parallel::run_isolated(
        &files,
        import.max_workers,
        |path| FileImportWorker::new(ctx, path).run(),
        |path, message| {
            let err = EtlError::WorkerPanicked(display_name(path));
            ImportOutcome::failed(
                display_name(path),
                table_name_for(path, &import.table_prefix),
                format!("{err}: {message}"),
            )
        },
    );

    for outcome in &outcomes {
        match &outcome.failure {
            Some(message) => error!("Failed to process {}: {message}", outcome.file),
            None => info!(
                "Completed {}: {} successful, {} rejected",
                outcome.file, outcome.accepted, outcome.rejected
            ),
        }
    }

    let summary = ImportSummary::from_outcomes(outcomes);
    info!(
        "Import completed: {} total successful rows, {} total rejected rows",
        summary.total_accepted, summary.total_rejected
    );
    Ok(summary)
}
