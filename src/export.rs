//! Table export to timestamped CSV files.
//!
//! Each table is exported independently: an empty table is skipped with a
//! warning, a failing table is logged and the remaining tables still run.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Local;
use log::{error, info, warn};
use serde::Serialize;

use crate::{
    context::RunContext,
    error::{EtlError, Result},
    io_utils, parallel,
    storage::{Storage, quote_identifier},
};

pub const EXPORT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportOutcome {
    Written { path: PathBuf, rows: usize },
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableExport {
    pub table: String,
    pub outcome: ExportOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportSummary {
    pub exports: Vec<TableExport>,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExportSummary {
    fn from_exports(exports: Vec<TableExport>) -> Self {
        let mut summary = ExportSummary::default();
        for export in &exports {
            match export.outcome {
                ExportOutcome::Written { .. } => summary.written += 1,
                ExportOutcome::Skipped => summary.skipped += 1,
                ExportOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary.exports = exports;
        summary
    }
}

/// Tables whose names start with `prefix` (ASCII case-insensitive, as SQL
/// `LIKE` matches).
pub fn discover_export_tables(storage: &dyn Storage, prefix: &str) -> Result<Vec<String>> {
    let tables = storage.list_tables()?;
    Ok(tables
        .into_iter()
        .filter(|name| {
            name.get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        })
        .collect())
}

/// Writes the full contents of `table` to `<dest>/<table>_<timestamp>.csv`.
pub fn export_table(storage: &dyn Storage, table: &str, dest: &Path) -> Result<ExportOutcome> {
    let sql = format!("SELECT * FROM {}", quote_identifier(table));
    let result = storage.execute_query(&sql, &[])?.unwrap_or_default();
    if result.is_empty() {
        warn!("No data found in table {table}");
        return Ok(ExportOutcome::Skipped);
    }

    fs::create_dir_all(dest).map_err(|err| EtlError::io(dest, err))?;
    let stamp = Local::now().format(EXPORT_TIMESTAMP_FORMAT);
    let path = dest.join(format!("{table}_{stamp}.csv"));
    let write_error = |err: csv::Error| EtlError::Export {
        table: table.to_string(),
        message: err.to_string(),
    };

    let mut writer = io_utils::open_csv_writer(&path, b',', false)?;
    writer.write_record(&result.columns).map_err(write_error)?;
    for row in &result.rows {
        writer
            .write_record(row.iter().map(|value| value.as_display()))
            .map_err(write_error)?;
    }
    io_utils::flush_writer(&mut writer, &path)?;

    info!("Exported {table} to {path:?}");
    Ok(ExportOutcome::Written {
        path,
        rows: result.len(),
    })
}

/// Exports `tables`, or every table carrying the import prefix when `None`.
pub fn run_export(
    ctx: &RunContext,
    dest: &Path,
    tables: Option<&[String]>,
) -> Result<ExportSummary> {
    let tables = match tables {
        Some(explicit) => explicit.to_vec(),
        None => discover_export_tables(ctx.storage(), &ctx.config().import.table_prefix)?,
    };
    if tables.is_empty() {
        info!("No export tables found");
        return Ok(ExportSummary::default());
    }
    info!("Exporting {} table(s) to {dest:?}", tables.len());

    let outcomes = parallel::run_isolated(
        &tables,
        ctx.config().import.max_workers,
        |table| match export_table(ctx.storage(), table, dest) {
            Ok(outcome) => outcome,
            Err(err) => {
                let err = EtlError::Export {
                    table: table.clone(),
                    message: err.to_string(),
                };
                error!("{err}");
                ExportOutcome::Failed(err.to_string())
            }
        },
        |table, message| {
            let err = EtlError::WorkerPanicked(table.clone());
            error!("{err}: {message}");
            ExportOutcome::Failed(format!("{err}: {message}"))
        },
    );

    let exports = tables
        .into_iter()
        .zip(outcomes)
        .map(|(table, outcome)| TableExport { table, outcome })
        .collect();
    Ok(ExportSummary::from_exports(exports))
}
