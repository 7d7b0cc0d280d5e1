//! Column types, the per-file [`Schema`], and sample-based type inference.
//!
//! A schema is inferred once per file from a bounded prefix of its data rows
//! and is immutable afterwards. Each [`ColumnType`] variant owns its cell
//! parsing and SQL type rendering, so validation and loading never branch on
//! type names.
//!
//! ## Inference order
//!
//! Empty (after trimming) sample values carry no evidence. A column with no
//! evidence is `Text(max)`. Otherwise the first rule that holds for every
//! sampled value wins:
//!
//! 1. numeric: `Integer` when every value is whole, else `Float`
//! 2. datetime: the first of [`DateFormat::INFERENCE_ORDER`] matching all values
//! 3. `Text(min(max, longest + 10))`

use std::{
    collections::HashSet,
    fmt,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use csv::ByteRecord;
use encoding_rs::Encoding;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    data::{
        CellError, DateFormat, Value, parse_any_datetime, parse_number, parse_whole_number,
    },
    error::{EtlError, Result},
    io_utils,
};

/// Extra room given to inferred text columns over the longest sampled value.
pub const TEXT_LENGTH_BUFFER: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    DateTime(DateFormat),
    Text(usize),
}

impl ColumnType {
    pub fn sql_type(&self) -> String {
        match self {
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::DateTime(_) => "DATETIME".to_string(),
            ColumnType::Text(len) => format!("VARCHAR({len})"),
        }
    }

    /// Parses one raw cell. Blank cells are `Null` except in integer
    /// columns, where they are invalid; text cells are kept exactly as read.
    pub fn parse_cell(&self, raw: &str) -> std::result::Result<Value, CellError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return match self {
                ColumnType::Integer => Err(CellError::new(raw, "integer")),
                _ => Ok(Value::Null),
            };
        }
        match self {
            ColumnType::Integer => parse_whole_number(trimmed)
                .map(Value::Integer)
                .ok_or_else(|| CellError::new(raw, "integer")),
            ColumnType::Float => parse_number(trimmed)
                .map(Value::Float)
                .ok_or_else(|| CellError::new(raw, "float")),
            ColumnType::DateTime(format) => format
                .parse(trimmed)
                .or_else(|| parse_any_datetime(trimmed))
                .map(Value::DateTime)
                .ok_or_else(|| CellError::new(raw, "datetime")),
            ColumnType::Text(_) => Ok(Value::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => f.write_str("INTEGER"),
            ColumnType::Float => f.write_str("FLOAT"),
            ColumnType::DateTime(_) => f.write_str("DATETIME"),
            ColumnType::Text(len) => write!(f, "TEXT({len})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub datatype: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnMeta>,
}

impl Schema {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_type(&self, name: &str) -> Option<&ColumnType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.datatype)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|err| EtlError::io(path, err))?;
        serde_yaml::to_writer(BufWriter::new(file), self)
            .map_err(|err| EtlError::Config(format!("Writing schema {path:?}: {err}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|err| EtlError::io(path, err))?;
        serde_yaml::from_reader(BufReader::new(file))
            .map_err(|err| EtlError::Config(format!("Parsing schema {path:?}: {err}")))
    }
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    observed: usize,
    longest: usize,
    possible_number: bool,
    possible_integer: bool,
    possible_formats: [bool; DateFormat::INFERENCE_ORDER.len()],
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            observed: 0,
            longest: 0,
            possible_number: true,
            possible_integer: true,
            possible_formats: [true; DateFormat::INFERENCE_ORDER.len()],
        }
    }

    fn update(&mut self, value: &str) {
        if value.is_empty() {
            return;
        }
        self.observed += 1;
        self.longest = self.longest.max(value.chars().count());

        if self.possible_number {
            if parse_number(value).is_none() {
                self.possible_number = false;
                self.possible_integer = false;
            } else if self.possible_integer && parse_whole_number(value).is_none() {
                self.possible_integer = false;
            }
        }
        for (possible, format) in self
            .possible_formats
            .iter_mut()
            .zip(DateFormat::INFERENCE_ORDER)
        {
            if *possible && format.parse(value).is_none() {
                *possible = false;
            }
        }
    }

    fn decide(&self, max_text_length: usize) -> ColumnType {
        if self.observed == 0 {
            return ColumnType::Text(max_text_length);
        }
        if self.possible_number {
            return if self.possible_integer {
                ColumnType::Integer
            } else {
                ColumnType::Float
            };
        }
        if let Some(format) = self
            .possible_formats
            .iter()
            .zip(DateFormat::INFERENCE_ORDER)
            .find_map(|(possible, format)| possible.then_some(format))
        {
            return ColumnType::DateTime(format);
        }
        ColumnType::Text(max_text_length.min(self.longest + TEXT_LENGTH_BUFFER))
    }
}

/// Trims header names, names blank headers `column_<n>` and suffixes
/// duplicates with `.1`, `.2`, ... (compared case-insensitively, as SQL does).
pub fn normalize_headers(raw: &[String]) -> Vec<String> {
    let mut emitted = HashSet::new();
    raw.iter()
        .enumerate()
        .map(|(idx, name)| {
            let trimmed = name.trim();
            let base = if trimmed.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                trimmed.to_string()
            };
            let mut candidate = base.clone();
            let mut suffix = 1usize;
            while !emitted.insert(candidate.to_lowercase()) {
                candidate = format!("{base}.{suffix}");
                suffix += 1;
            }
            candidate
        })
        .collect()
}

/// Infers a schema from up to `sample_rows` data rows (`0` scans the file).
///
/// Malformed content never fails inference; it only pushes columns towards
/// text. I/O and CSV framing errors are returned.
pub fn infer_schema(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
    sample_rows: usize,
    max_text_length: usize,
) -> Result<Schema> {
    let sample_error = |source: csv::Error| EtlError::SampleRead {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = normalize_headers(
        &io_utils::reader_headers(&mut reader, encoding).map_err(sample_error)?,
    );
    let mut candidates = vec![TypeCandidate::new(); headers.len()];

    let mut record = ByteRecord::new();
    let mut processed = 0usize;
    while sample_rows == 0 || processed < sample_rows {
        if !reader.read_byte_record(&mut record).map_err(sample_error)? {
            break;
        }
        for (candidate, field) in candidates.iter_mut().zip(record.iter()) {
            let (decoded, _) = encoding.decode_without_bom_handling(field);
            candidate.update(decoded.trim());
        }
        processed += 1;
    }
    debug!("Sampled {processed} row(s) from {path:?}");

    let columns = headers
        .into_iter()
        .zip(candidates)
        .map(|(name, candidate)| ColumnMeta {
            name,
            datatype: candidate.decide(max_text_length),
        })
        .collect();
    Ok(Schema { columns })
}
