use std::fmt;

use chrono::{DateTime, Utc};
use mongodb::bson::{self, Bson};

use crate::raptors::etl::error::{EtlError, Result};

/// Largest magnitude a whole number may have and still be stored as an
/// `Int64` (2^63).
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Represents a single value in a tabular frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Missing value (empty spreadsheet cell, unmatched join, BSON null).
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Text view used by string derivations. Whole-number floats render
    /// without a fractional part so `201801.0` slices like `201801`.
    pub fn render(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Bool(value) => Some(value.to_string()),
            Cell::Int(value) => Some(value.to_string()),
            Cell::Float(value) if value.fract() == 0.0 && value.abs() < I64_BOUND => {
                Some(format!("{}", *value as i64))
            }
            Cell::Float(value) => Some(value.to_string()),
            Cell::Text(value) => Some(value.clone()),
            Cell::Timestamp(value) => Some(value.to_rfc3339()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(value) => Some(*value as f64),
            Cell::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Key used for joins, dedupes and distinct values. Numbers compare by
    /// value regardless of their integer or float representation.
    pub fn key(&self) -> CellKey {
        match self {
            Cell::Null => CellKey::Null,
            Cell::Bool(value) => CellKey::Bool(*value),
            Cell::Int(value) => CellKey::Int(*value),
            Cell::Float(value) if value.fract() == 0.0 && value.abs() < I64_BOUND => {
                CellKey::Int(*value as i64)
            }
            Cell::Float(value) => CellKey::Float(value.to_bits()),
            Cell::Text(value) => CellKey::Text(value.clone()),
            Cell::Timestamp(value) => CellKey::Timestamp(value.timestamp_millis()),
        }
    }

    /// Converts the cell into BSON for insertion. Whole-number floats are
    /// stored as `Int64`; one outside the i64 range is a `NumericOverflow`.
    pub fn to_bson(&self, field: &str) -> Result<Bson> {
        Ok(match self {
            Cell::Null => Bson::Null,
            Cell::Bool(value) => Bson::Boolean(*value),
            Cell::Int(value) => Bson::Int64(*value),
            Cell::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                if value.abs() >= I64_BOUND {
                    return Err(EtlError::NumericOverflow {
                        field: field.to_string(),
                    });
                }
                Bson::Int64(*value as i64)
            }
            Cell::Float(value) => Bson::Double(*value),
            Cell::Text(value) => Bson::String(value.clone()),
            Cell::Timestamp(value) => {
                Bson::DateTime(bson::DateTime::from_millis(value.timestamp_millis()))
            }
        })
    }

    pub fn from_bson(value: &Bson) -> Self {
        match value {
            Bson::Null | Bson::Undefined => Cell::Null,
            Bson::Boolean(value) => Cell::Bool(*value),
            Bson::Int32(value) => Cell::Int(i64::from(*value)),
            Bson::Int64(value) => Cell::Int(*value),
            Bson::Double(value) if value.is_nan() => Cell::Null,
            Bson::Double(value) => Cell::Float(*value),
            Bson::String(value) => Cell::Text(value.clone()),
            Bson::DateTime(value) => DateTime::from_timestamp_millis(value.timestamp_millis())
                .map(Cell::Timestamp)
                .unwrap_or(Cell::Null),
            Bson::ObjectId(value) => Cell::Text(value.to_hex()),
            other => Cell::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render().unwrap_or_default())
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

/// Hashable, totally ordered projection of a [`Cell`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellKey {
    Null,
    Bool(bool),
    /// Integers, and floats holding a whole value.
    Int(i64),
    /// Bit pattern of a fractional or non-finite float.
    Float(u64),
    Text(String),
    Timestamp(i64),
}
