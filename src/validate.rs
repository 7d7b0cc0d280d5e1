//! Whole-row validation against an inferred [`Schema`].
//!
//! Rules short-circuit in order: field count first, then each cell under its
//! column's type. A rejected row is handed back exactly as read.

use std::fmt;

use crate::{
    data::{CellError, Value},
    schema::Schema,
};

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    ColumnCount { expected: usize, found: usize },
    Cell { column: String, error: CellError },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ColumnCount { expected, found } => {
                write!(f, "expected {expected} field(s), found {found}")
            }
            RejectReason::Cell { column, error } => write!(f, "column '{column}': {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowVerdict {
    /// Typed cells ready for insertion, one per schema column.
    Accepted(Vec<Value>),
    Rejected { row: Vec<String>, reason: RejectReason },
}

impl RowVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RowVerdict::Accepted(_))
    }
}

pub fn validate_row(row: Vec<String>, expected_columns: usize, schema: &Schema) -> RowVerdict {
    if row.len() != expected_columns {
        let found = row.len();
        return RowVerdict::Rejected {
            row,
            reason: RejectReason::ColumnCount {
                expected: expected_columns,
                found,
            },
        };
    }

    let mut typed = Vec::with_capacity(row.len());
    for (cell, column) in row.iter().zip(&schema.columns) {
        match column.datatype.parse_cell(cell) {
            Ok(value) => typed.push(value),
            Err(error) => {
                let column = column.name.clone();
                return RowVerdict::Rejected {
                    row,
                    reason: RejectReason::Cell { column, error },
                };
            }
        }
    }
    RowVerdict::Accepted(typed)
}
