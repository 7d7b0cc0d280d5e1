use itertools::Itertools;
use log::{debug, error, info};

use crate::{
    data::Value,
    error::{EtlError, Result},
    schema::Schema,
    storage::{Statement, Storage, quote_identifier},
};

/// Upper bound on bound parameters per statement (SQLite's default
/// `SQLITE_MAX_VARIABLE_NUMBER`).
pub const MAX_BOUND_PARAMS: usize = 32_766;

pub struct BatchLoader<'a> {
    storage: &'a dyn Storage,
    fast_bulk_insert: bool,
}

impl<'a> BatchLoader<'a> {
    pub fn new(storage: &'a dyn Storage, fast_bulk_insert: bool) -> Self {
        Self {
            storage,
            fast_bulk_insert,
        }
    }

    /// Creates `table` from `schema` unless it already exists. Returns whether
    /// a table was created; an existing table is never altered.
    pub fn ensure_table(&self, table: &str, schema: &Schema) -> Result<bool> {
        if self.storage.table_exists(table)? {
            debug!("Table {table} already exists");
            return Ok(false);
        }
        self.storage.create_table(table, schema)?;
        info!("Created table: {table}");
        Ok(true)
    }

    /// Inserts `rows` in a single transaction and returns how many landed.
    ///
    /// A storage failure rolls back the whole batch and counts as zero; the
    /// rows are not sent to the reject stream.
    pub fn insert_batch(&self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> usize {
        if rows.is_empty() {
            return 0;
        }
        let statements = build_insert_statements(table, columns, rows, self.fast_bulk_insert);
        match self.storage.execute_in_transaction(&statements) {
            Ok(_) => rows.len(),
            Err(source) => {
                let err = EtlError::BatchWrite {
                    table: table.to_string(),
                    source,
                };
                error!("{err} ({} row(s) discarded)", rows.len());
                0
            }
        }
    }
}

pub fn build_insert_statements(
    table: &str,
    columns: &[String],
    rows: &[Vec<Value>],
    fast_bulk_insert: bool,
) -> Vec<Statement> {
    let prefix = format!(
        "INSERT INTO {} ({}) VALUES ",
        quote_identifier(table),
        columns.iter().map(|c| quote_identifier(c)).join(", ")
    );
    let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));

    let rows_per_statement = if fast_bulk_insert {
        (MAX_BOUND_PARAMS / columns.len().max(1)).max(1)
    } else {
        1
    };

    rows.chunks(rows_per_statement)
        .map(|group| Statement {
            sql: format!(
                "{prefix}{}",
                std::iter::repeat_n(placeholders.as_str(), group.len()).join(", ")
            ),
            params: group.iter().flatten().cloned().collect(),
        })
        .collect()
}
