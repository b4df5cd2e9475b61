use std::str::FromStr;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use bigdecimal::BigDecimal;
use serde_json::Value;

use crate::bail;
use crate::conversions::bool::parse_logical;
use crate::conversions::temporal::{parse_date, parse_timestamp, parse_timestamp_utc};
use crate::error::{ErrorKind, ProrepResult};
use crate::schema::{ColumnMapping, ColumnType};
use crate::types::Cell;

/// Separator placed between the elements of a flattened extent column.
pub const EXTENT_SEPARATOR: &str = ", ";

/// Flattens an extent (array) value into a single delimited string.
///
/// Strings are taken verbatim, other scalars use their JSON rendering and nulls become empty
/// elements. A non-array value is rendered as a single element.
pub fn flatten_extent(value: &Value) -> String {
    match value {
        Value::Array(values) => values
            .iter()
            .map(extent_element)
            .collect::<Vec<_>>()
            .join(EXTENT_SEPARATOR),
        other => extent_element(other),
    }
}

fn extent_element(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}

/// Converts a payload value for `column` into a typed [`Cell`].
pub fn json_to_cell(column: &ColumnMapping, value: &Value) -> ProrepResult<Cell> {
    if value.is_null() {
        let column_type = if column.is_extent() {
            ColumnType::Raw
        } else {
            column.column_type
        };
        return Ok(Cell::Null(column_type));
    }

    if column.is_extent() {
        return Ok(Cell::String(flatten_extent(value)));
    }

    match column.column_type {
        ColumnType::Character { .. } | ColumnType::Raw | ColumnType::Clob | ColumnType::Other => {
            Ok(Cell::String(to_text(value)))
        }
        ColumnType::Logical => match value {
            Value::Bool(value) => Ok(Cell::Bool(*value)),
            Value::String(value) => Ok(Cell::Bool(parse_logical(value)?)),
            Value::Number(number) => match number.as_i64() {
                Some(0) => Ok(Cell::Bool(false)),
                Some(1) => Ok(Cell::Bool(true)),
                _ => invalid(column, value),
            },
            _ => invalid(column, value),
        },
        ColumnType::Decimal { .. } => match value {
            Value::Number(number) => Ok(Cell::Numeric(BigDecimal::from_str(
                &number.to_string(),
            )?)),
            Value::String(value) => Ok(Cell::Numeric(BigDecimal::from_str(value.trim())?)),
            _ => invalid(column, value),
        },
        ColumnType::Float => match value {
            Value::Number(number) => match number.as_f64() {
                Some(number) => Ok(Cell::F64(number)),
                None => invalid(column, value),
            },
            Value::String(text) => match text.trim().parse::<f64>() {
                Ok(number) => Ok(Cell::F64(number)),
                Err(_) => invalid(column, value),
            },
            _ => invalid(column, value),
        },
        ColumnType::Int64 | ColumnType::Recid => Ok(Cell::I64(to_i64(column, value)?)),
        ColumnType::Integer => {
            let number = to_i64(column, value)?;
            match i32::try_from(number) {
                Ok(number) => Ok(Cell::I32(number)),
                Err(_) => invalid(column, value),
            }
        }
        ColumnType::Date => Ok(Cell::Date(parse_date(expect_str(column, value)?)?)),
        ColumnType::Datetime => Ok(Cell::Timestamp(parse_timestamp(expect_str(
            column, value,
        )?)?)),
        ColumnType::DatetimeTz => Ok(Cell::TimestampTz(parse_timestamp_utc(expect_str(
            column, value,
        )?)?)),
        ColumnType::Blob => Ok(Cell::Bytes(
            BASE64_STANDARD.decode(expect_str(column, value)?.trim())?,
        )),
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}

fn to_i64(column: &ColumnMapping, value: &Value) -> ProrepResult<i64> {
    match value {
        Value::Number(number) => match number.as_i64() {
            Some(number) => Ok(number),
            None => invalid(column, value),
        },
        Value::String(text) => Ok(text.trim().parse::<i64>()?),
        _ => invalid(column, value),
    }
}

fn expect_str<'a>(column: &ColumnMapping, value: &'a Value) -> ProrepResult<&'a str> {
    match value {
        Value::String(value) => Ok(value),
        _ => invalid(column, value),
    }
}

fn invalid<T>(column: &ColumnMapping, value: &Value) -> ProrepResult<T> {
    bail!(
        ErrorKind::ConversionError,
        "Value does not match the declared column type",
        format!(
            "column '{}' ({:?}) received {value}",
            column.source_name, column.column_type
        )
    )
}
