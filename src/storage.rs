//! Relational storage used by the loader and exporter.
//!
//! The pipelines only see the [`Storage`] trait. [`SqliteStore`] opens a fresh
//! connection for every call; nothing is pooled or shared between workers.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use itertools::Itertools;
use log::debug;
use rusqlite::{
    Connection, params_from_iter,
    types::{ToSql, ToSqlOutput, ValueRef},
};
use thiserror::Error;

use crate::{
    data::{STORAGE_DATETIME_FORMAT, Value},
    schema::Schema,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create table '{0}' without columns")]
    NoColumns(String),

    #[error("Preparing database location {path:?}: {source}")]
    Location {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// One parameterized statement to run inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

pub trait Storage: Send + Sync {
    fn table_exists(&self, name: &str) -> Result<bool, StorageError>;

    fn create_table(&self, name: &str, schema: &Schema) -> Result<(), StorageError>;

    /// Runs one statement. Returns rows for statements that produce columns.
    fn execute_query(&self, sql: &str, params: &[Value])
    -> Result<Option<QueryResult>, StorageError>;

    /// Runs every statement in one transaction; any failure rolls all of them
    /// back. Returns the number of rows changed.
    fn execute_in_transaction(&self, statements: &[Statement]) -> Result<usize, StorageError>;

    fn list_tables(&self) -> Result<Vec<String>, StorageError>;
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn create_table_sql(name: &str, schema: &Schema) -> String {
    let columns = schema
        .columns
        .iter()
        .map(|column| {
            format!(
                "{} {}",
                quote_identifier(&column.name),
                column.datatype.sql_type()
            )
        })
        .join(",\n    ");
    format!("CREATE TABLE {} (\n    {columns}\n)", quote_identifier(name))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Float(f) => ToSqlOutput::from(*f),
            Value::DateTime(dt) => {
                ToSqlOutput::from(dt.format(STORAGE_DATETIME_FORMAT).to_string())
            }
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Prepares the database file (parent folders, WAL journal) and returns a
    /// store that connects on demand.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StorageError::Location {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let store = Self {
            path: path.to_path_buf(),
            busy_timeout,
        };
        let conn = store.connect()?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!("Opened {:?} (journal_mode={mode})", store.path);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StorageError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}

impl Storage for SqliteStore {
    fn table_exists(&self, name: &str) -> Result<bool, StorageError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_table(&self, name: &str, schema: &Schema) -> Result<(), StorageError> {
        if schema.is_empty() {
            return Err(StorageError::NoColumns(name.to_string()));
        }
        let sql = create_table_sql(name, schema);
        debug!("{sql}");
        self.connect()?.execute(&sql, [])?;
        Ok(())
    }

    fn execute_query(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<QueryResult>, StorageError> {
        let conn = self.connect()?;
        let mut statement = conn.prepare(sql)?;
        if statement.column_count() == 0 {
            statement.execute(params_from_iter(params.iter()))?;
            return Ok(None);
        }

        let columns = statement
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = statement.query(params_from_iter(params.iter()))?;
        while let Some(row) = cursor.next()? {
            let values = (0..width)
                .map(|idx| row.get_ref(idx).map(value_from_ref))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(values);
        }
        Ok(Some(QueryResult { columns, rows }))
    }

    fn execute_in_transaction(&self, statements: &[Statement]) -> Result<usize, StorageError> {
        let mut conn = self.connect()?;
        // Dropping an uncommitted transaction rolls it back.
        let tx = conn.transaction()?;
        let mut changed = 0usize;
        for statement in statements {
            let mut prepared = tx.prepare_cached(&statement.sql)?;
            changed += prepared.execute(params_from_iter(statement.params.iter()))?;
        }
        tx.commit()?;
        Ok(changed)
    }

    fn list_tables(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.connect()?;
        let mut statement = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}
