use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical text form used when a datetime cell is written to storage.
pub const STORAGE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Text(String),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::DateTime(dt) => dt.format(STORAGE_DATETIME_FORMAT).to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{value}' is not a valid {expected}")]
pub struct CellError {
    pub value: String,
    pub expected: &'static str,
}

impl CellError {
    pub fn new(value: &str, expected: &'static str) -> Self {
        Self {
            value: value.to_string(),
            expected,
        }
    }
}

/// Datetime layouts tried during inference, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    IsoDate,
    DayFirst,
    MonthFirst,
    IsoDateTime,
}

impl DateFormat {
    pub const INFERENCE_ORDER: [DateFormat; 4] = [
        DateFormat::IsoDate,
        DateFormat::DayFirst,
        DateFormat::MonthFirst,
        DateFormat::IsoDateTime,
    ];

    pub fn pattern(self) -> &'static str {
        match self {
            DateFormat::IsoDate => "%Y-%m-%d",
            DateFormat::DayFirst => "%d/%m/%Y",
            DateFormat::MonthFirst => "%m/%d/%Y",
            DateFormat::IsoDateTime => "%Y-%m-%d %H:%M:%S",
        }
    }

    fn has_time(self) -> bool {
        matches!(self, DateFormat::IsoDateTime)
    }

    /// Strict parse: the whole value must match this layout.
    pub fn parse(self, value: &str) -> Option<NaiveDateTime> {
        if self.has_time() {
            NaiveDateTime::parse_from_str(value, self.pattern()).ok()
        } else {
            NaiveDate::parse_from_str(value, self.pattern())
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        }
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pattern())
    }
}

/// Parses a finite decimal number, ignoring surrounding whitespace.
pub fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
}

/// Parses an integer literal or a whole-valued decimal such as `10.0`.
pub fn parse_whole_number(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if let Ok(parsed) = trimmed.parse::<i64>() {
        return Some(parsed);
    }
    let parsed = parse_number(trimmed)?;
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
    if parsed.fract() == 0.0 && parsed >= i64::MIN as f64 && parsed < i64::MAX as f64 {
        Some(parsed as i64)
    } else {
        None
    }
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y", "%d.%m.%Y",
    ];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%m/%d/%Y %H:%M",
    ];
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

/// Lenient datetime parser used for row validation. Accepts any layout the
/// loader knows about, not only the one a column was inferred with.
pub fn parse_any_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    parse_naive_datetime(trimmed).or_else(|| {
        parse_naive_date(trimmed).and_then(|date| date.and_hms_opt(0, 0, 0))
    })
}
