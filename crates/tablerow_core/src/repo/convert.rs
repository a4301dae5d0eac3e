//! Crossing points between `Value` and the backend.
//!
//! Parameter binding and result extraction both match exhaustively on the
//! value or type code, so a new variant fails to compile until it is handled
//! here.

use crate::db::{DbError, DbResult};
use crate::dialect::{BooleanStorage, Dialect};
use crate::model::value::coercion;
use crate::model::{Row, RowLayout, SqlType, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Rejects positional parameters that cannot be bound directly.
///
/// `index` is 1-based. Nulls are rejected: an intentional null goes through a
/// row column instead.
pub(crate) fn check_parameter(index: usize, value: &Value) -> DbResult<()> {
    match value {
        Value::Null => Err(DbError::NullParameter(index)),
        Value::Text(_)
        | Value::Short(_)
        | Value::Int(_)
        | Value::Long(_)
        | Value::Float(_)
        | Value::Double(_)
        | Value::Date(_)
        | Value::Time(_)
        | Value::Timestamp(_) => Ok(()),
        Value::Bool(_) | Value::Decimal(_) | Value::Bytes(_) => Err(DbError::UnsupportedParameter {
            index,
            kind: value.kind_name(),
        }),
    }
}

/// Converts a row value to what the backend stores for a column of `sql_type`.
pub(crate) fn column_value(
    dialect: &dyn Dialect,
    column: &str,
    sql_type: &SqlType,
    value: &Value,
) -> DbResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let converted = match sql_type {
        SqlType::Boolean => {
            let flag = value.to_bool(column)?;
            match dialect.boolean_storage() {
                BooleanStorage::Native => flag.map(Value::Bool),
                BooleanStorage::Integer => flag.map(|flag| Value::Int(i32::from(flag))),
            }
        }
        SqlType::Integer if dialect.wide_integers() => value.to_long(column)?.map(Value::Long),
        SqlType::Integer => value.to_int(column)?.map(Value::Int),
        SqlType::BigInt => value.to_long(column)?.map(Value::Long),
        SqlType::Numeric => value.to_decimal(column)?.map(Value::Decimal),
        SqlType::Double => value.to_double(column)?.map(Value::Double),
        SqlType::Text => value.to_str(column)?.map(Value::from),
        SqlType::Date => value.to_date(column)?.map(Value::Date),
        SqlType::Time => value.to_time(column)?.map(Value::Time),
        SqlType::Timestamp => value.to_timestamp(column)?.map(Value::Timestamp),
        SqlType::Untyped => Some(value.clone()),
        SqlType::Other(name) => {
            return Err(DbError::UnsupportedType {
                column: column.to_string(),
                sql_type: name.clone(),
            })
        }
    };
    Ok(converted.unwrap_or(Value::Null))
}

/// Reads a raw driver value as a column of `sql_type`.
pub(crate) fn extract(
    dialect: &dyn Dialect,
    column: &str,
    sql_type: &SqlType,
    raw: Value,
) -> DbResult<Value> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let value = match sql_type {
        SqlType::Boolean => Value::from(raw.to_bool(column)?),
        SqlType::Integer if dialect.wide_integers() => Value::from(raw.to_long(column)?),
        SqlType::Integer => Value::from(raw.to_int(column)?),
        SqlType::BigInt => Value::from(raw.to_long(column)?),
        SqlType::Numeric => match raw {
            Value::Text(ref text) => Decimal::from_str(text.trim())
                .map(Value::Decimal)
                .map_err(|_| coercion(column, "decimal", &raw))?,
            _ => Value::from(raw.to_decimal(column)?),
        },
        SqlType::Double => Value::from(raw.to_double(column)?),
        SqlType::Text => extract_text(column, raw)?,
        SqlType::Date => match raw {
            Value::Date(_) => raw,
            _ => Value::Date(parse_text(column, "date", &raw, |text| {
                NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
            })?),
        },
        SqlType::Time => match raw {
            Value::Time(_) => raw,
            _ => Value::Time(parse_text(column, "time", &raw, |text| {
                NaiveTime::parse_from_str(text, TIME_FORMAT).ok()
            })?),
        },
        SqlType::Timestamp => match raw {
            Value::Timestamp(_) | Value::Date(_) => Value::from(raw.to_timestamp(column)?),
            _ => Value::Timestamp(parse_text(column, "timestamp", &raw, parse_timestamp)?),
        },
        SqlType::Untyped => raw,
        SqlType::Other(name) => {
            return Err(DbError::UnsupportedType {
                column: column.to_string(),
                sql_type: name.clone(),
            })
        }
    };
    Ok(value)
}

fn extract_text(column: &str, raw: Value) -> DbResult<Value> {
    match raw {
        Value::Text(_) => Ok(raw),
        // Some drivers hand back undecoded payloads for character columns.
        Value::Bytes(bytes) => String::from_utf8(bytes)
            .map(Value::Text)
            .map_err(|err| coercion(column, "string", &Value::Bytes(err.into_bytes()))),
        Value::Short(_) | Value::Int(_) | Value::Long(_) | Value::Decimal(_) => {
            Ok(Value::Text(raw.to_string()))
        }
        other => Err(coercion(column, "string", &other)),
    }
}

fn parse_text<T>(
    column: &str,
    target: &'static str,
    raw: &Value,
    parse: impl Fn(&str) -> Option<T>,
) -> DbResult<T> {
    match raw {
        Value::Text(text) => parse(text.trim()).ok_or_else(|| coercion(column, target, raw)),
        _ => Err(coercion(column, target, raw)),
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Maps one result column onto one row slot.
#[derive(Debug, Clone)]
pub(crate) struct ColumnPlan {
    /// Slot in the row layout.
    pub position: usize,
    /// Index in the raw result row.
    pub source: usize,
    pub name: String,
    pub sql_type: SqlType,
}

/// Builds a loaded row: values extracted per plan, dirty flags cleared.
pub(crate) fn materialize(
    dialect: &dyn Dialect,
    table: Option<&str>,
    layout: &Arc<RowLayout>,
    plan: &[ColumnPlan],
    mut raw: Vec<Value>,
) -> DbResult<Row> {
    let mut row = Row::new(table, Arc::clone(layout));
    for column in plan {
        let Some(slot) = raw.get_mut(column.source) else {
            continue;
        };
        let value = std::mem::replace(slot, Value::Null);
        row.set_at(
            column.position,
            extract(dialect, &column.name, &column.sql_type, value)?,
        );
    }
    row.reset_changed();
    Ok(row)
}

/// Renders bound values for debug logs.
pub(crate) fn render_params(params: &[Value]) -> String {
    let rendered: Vec<String> = params
        .iter()
        .map(|value| match value {
            Value::Text(text) => format!("'{text}'"),
            other => other.to_string(),
        })
        .collect();
    format!("[{}]", rendered.join(", "))
}
