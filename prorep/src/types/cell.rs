use std::fmt;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::schema::ColumnType;

/// A typed value ready to be bound to a target store statement.
///
/// [`Cell::Null`] remembers the declared column type so that the store can bind a typed NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null(ColumnType),
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Numeric(BigDecimal),
    String(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null(_))
    }

    /// Returns the cell as a 64-bit integer if it holds an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::I32(value) => Some(i64::from(*value)),
            Cell::I64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null(_) => f.write_str("NULL"),
            Cell::Bool(value) => write!(f, "{value}"),
            Cell::I32(value) => write!(f, "{value}"),
            Cell::I64(value) => write!(f, "{value}"),
            Cell::F64(value) => write!(f, "{value}"),
            Cell::Numeric(value) => write!(f, "{value}"),
            Cell::String(value) => write!(f, "{value:?}"),
            Cell::Date(value) => write!(f, "{value}"),
            Cell::Timestamp(value) => write!(f, "{value}"),
            Cell::TimestampTz(value) => write!(f, "{}", value.to_rfc3339()),
            Cell::Bytes(value) => write!(f, "base64:{}", BASE64_STANDARD.encode(value)),
        }
    }
}
