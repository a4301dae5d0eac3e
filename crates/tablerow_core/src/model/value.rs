//! Column values and backend type codes.
//!
//! # Responsibility
//! - Represent every supported column value as one tagged union.
//! - Provide value-preserving coercions used by `Row` accessors.
//!
//! # Invariants
//! - `Value::Null` is the only SQL-null representation.
//! - Coercions never truncate or reinterpret; a lossy read is an error.

use crate::db::{DbError, DbResult};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt::{Display, Formatter};

/// Largest magnitude an `i64` can have and still convert to `f64` exactly.
const MAX_EXACT_F64_INT: u64 = 1 << 53;

/// Backend type code for one column, as reported by schema introspection or
/// live result metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    Integer,
    BigInt,
    /// Arbitrary-precision `NUMERIC`/`DECIMAL`.
    Numeric,
    Double,
    Text,
    Date,
    Time,
    Timestamp,
    /// Any type without a bind/extract routine; carries the backend's name.
    Other(String),
    /// Result column with no declared type; values keep their storage class.
    Untyped,
}

impl SqlType {
    pub fn name(&self) -> &str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Numeric => "NUMERIC",
            Self::Double => "DOUBLE",
            Self::Text => "TEXT",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Other(name) => name.as_str(),
            Self::Untyped => "UNTYPED",
        }
    }
}

impl Display for SqlType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One column value.
///
/// Adding a variant is a compile-time-checked change: parameter binding and
/// result extraction both match on it exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    /// Raw payload as returned by a driver; decoded during extraction.
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Equality that ignores integer width: `Int(5)` matches `Long(5)`.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self.as_integer(), other.as_integer()) {
            (Some(left), Some(right)) => left == right,
            _ => self == other,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Short(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Short type label used in error messages and logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub(crate) fn to_int(&self, column: &str) -> DbResult<Option<i32>> {
        match self {
            Self::Null => Ok(None),
            Self::Short(v) => Ok(Some(i32::from(*v))),
            Self::Int(v) => Ok(Some(*v)),
            Self::Long(v) => i32::try_from(*v)
                .map(Some)
                .map_err(|_| coercion(column, "int", self)),
            Self::Decimal(v) if v.fract().is_zero() => v
                .to_i32()
                .map(Some)
                .ok_or_else(|| coercion(column, "int", self)),
            _ => Err(coercion(column, "int", self)),
        }
    }

    pub(crate) fn to_long(&self, column: &str) -> DbResult<Option<i64>> {
        match self {
            Self::Null => Ok(None),
            Self::Short(v) => Ok(Some(i64::from(*v))),
            Self::Int(v) => Ok(Some(i64::from(*v))),
            Self::Long(v) => Ok(Some(*v)),
            Self::Decimal(v) if v.fract().is_zero() => v
                .to_i64()
                .map(Some)
                .ok_or_else(|| coercion(column, "long", self)),
            _ => Err(coercion(column, "long", self)),
        }
    }

    pub(crate) fn to_decimal(&self, column: &str) -> DbResult<Option<Decimal>> {
        match self {
            Self::Null => Ok(None),
            Self::Short(v) => Ok(Some(Decimal::from(*v))),
            Self::Int(v) => Ok(Some(Decimal::from(*v))),
            Self::Long(v) => Ok(Some(Decimal::from(*v))),
            Self::Decimal(v) => Ok(Some(*v)),
            Self::Float(v) => Decimal::try_from(*v)
                .map(Some)
                .map_err(|_| coercion(column, "decimal", self)),
            Self::Double(v) => Decimal::try_from(*v)
                .map(Some)
                .map_err(|_| coercion(column, "decimal", self)),
            _ => Err(coercion(column, "decimal", self)),
        }
    }

    pub(crate) fn to_double(&self, column: &str) -> DbResult<Option<f64>> {
        match self {
            Self::Null => Ok(None),
            Self::Short(v) => Ok(Some(f64::from(*v))),
            Self::Int(v) => Ok(Some(f64::from(*v))),
            Self::Long(v) if v.unsigned_abs() <= MAX_EXACT_F64_INT => Ok(Some(*v as f64)),
            Self::Float(v) => Ok(Some(f64::from(*v))),
            Self::Double(v) => Ok(Some(*v)),
            Self::Decimal(v) => v
                .to_f64()
                .map(Some)
                .ok_or_else(|| coercion(column, "double", self)),
            _ => Err(coercion(column, "double", self)),
        }
    }

    /// Accepts native booleans and 0/1 integers alike.
    pub(crate) fn to_bool(&self, column: &str) -> DbResult<Option<bool>> {
        let as_flag = |flag: i64| match flag {
            0 => Ok(Some(false)),
            1 => Ok(Some(true)),
            _ => Err(coercion(column, "boolean", self)),
        };
        match self {
            Self::Null => Ok(None),
            Self::Bool(v) => Ok(Some(*v)),
            Self::Short(v) => as_flag(i64::from(*v)),
            Self::Int(v) => as_flag(i64::from(*v)),
            Self::Long(v) => as_flag(*v),
            Self::Decimal(v) if v.fract().is_zero() => match v.to_i64() {
                Some(flag) => as_flag(flag),
                None => Err(coercion(column, "boolean", self)),
            },
            _ => Err(coercion(column, "boolean", self)),
        }
    }

    pub(crate) fn to_str(&self, column: &str) -> DbResult<Option<&str>> {
        match self {
            Self::Null => Ok(None),
            Self::Text(v) => Ok(Some(v.as_str())),
            _ => Err(coercion(column, "string", self)),
        }
    }

    pub(crate) fn to_date(&self, column: &str) -> DbResult<Option<NaiveDate>> {
        match self {
            Self::Null => Ok(None),
            Self::Date(v) => Ok(Some(*v)),
            _ => Err(coercion(column, "date", self)),
        }
    }

    pub(crate) fn to_time(&self, column: &str) -> DbResult<Option<NaiveTime>> {
        match self {
            Self::Null => Ok(None),
            Self::Time(v) => Ok(Some(*v)),
            _ => Err(coercion(column, "time", self)),
        }
    }

    pub(crate) fn to_timestamp(&self, column: &str) -> DbResult<Option<NaiveDateTime>> {
        match self {
            Self::Null => Ok(None),
            Self::Timestamp(v) => Ok(Some(*v)),
            Self::Date(v) => v
                .and_hms_opt(0, 0, 0)
                .map(Some)
                .ok_or_else(|| coercion(column, "timestamp", self)),
            _ => Err(coercion(column, "timestamp", self)),
        }
    }
}

pub(crate) fn coercion(column: &str, target: &'static str, value: &Value) -> DbError {
    DbError::Coercion {
        column: column.to_string(),
        target,
        value: value.to_string(),
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Self::Time(v) => write!(f, "{}", v.format("%H:%M:%S%.f")),
            Self::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i16> for Value {
    fn from(value: i16) -> Self {
        Self::Short(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Self::Time(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
