//! Plain-text tables for run summaries printed by the CLI.

use std::{borrow::Cow, fmt::Write as _};

use crate::{
    export::{ExportOutcome, ExportSummary},
    import::ImportSummary,
    schema::Schema,
};

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|h| h.chars().count().max(3))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(sanitize_cell(cell).chars().count());
        }
    }

    let mut output = String::new();
    let header_cells = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&header_cells, &widths));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| format!("{:<width$}", sanitize_cell(value)))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

pub fn render_import_summary(summary: &ImportSummary) -> String {
    let rows = summary
        .outcomes
        .iter()
        .map(|outcome| {
            vec![
                outcome.file.clone(),
                outcome.table.clone(),
                outcome.accepted.to_string(),
                outcome.rejected.to_string(),
                match &outcome.failure {
                    Some(message) => format!("FAILED: {message}"),
                    None => "ok".to_string(),
                },
            ]
        })
        .collect::<Vec<_>>();
    let mut output = render_table(&["file", "table", "loaded", "rejected", "status"], &rows);
    let _ = writeln!(
        output,
        "\nTotal: {} loaded, {} rejected, {} file(s) failed",
        summary.total_accepted, summary.total_rejected, summary.failed_files
    );
    output
}

pub fn render_export_summary(summary: &ExportSummary) -> String {
    let rows = summary
        .exports
        .iter()
        .map(|export| {
            let (status, rows, detail) = match &export.outcome {
                ExportOutcome::Written { path, rows } => {
                    ("written", rows.to_string(), path.display().to_string())
                }
                ExportOutcome::Skipped => ("skipped", "0".to_string(), "no data".to_string()),
                ExportOutcome::Failed(message) => ("failed", "0".to_string(), message.clone()),
            };
            vec![export.table.clone(), status.to_string(), rows, detail]
        })
        .collect::<Vec<_>>();
    let mut output = render_table(&["table", "status", "rows", "detail"], &rows);
    let _ = writeln!(
        output,
        "\nTotal: {} written, {} skipped, {} failed",
        summary.written, summary.skipped, summary.failed
    );
    output
}

pub fn render_schema(schema: &Schema) -> String {
    let rows = schema
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            vec![
                (idx + 1).to_string(),
                column.name.clone(),
                column.datatype.to_string(),
                column.datatype.sql_type(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&["#", "name", "type", "sql"], &rows)
}
