//! Schema-bound row value object with per-column dirty tracking.
//!
//! # Responsibility
//! - Hold one record's values against a fixed, ordered column set.
//! - Expose typed accessors with value-preserving coercion.
//! - Track which columns changed since the row was last synchronized.
//!
//! # Invariants
//! - The column set never changes after construction.
//! - Every column always holds a value or `Value::Null`; there is no unset state.
//! - Column lookup is case-insensitive; an unknown column is an error.
//! - Setting a column to an equal value does not raise its dirty flag;
//!   integers compare across widths.

use crate::db::{DbError, DbResult};
use crate::model::value::Value;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Ordered column names plus a case-insensitive lookup index.
///
/// Shared by every row of the same table so that materializing a row does
/// not rebuild the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl RowLayout {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            // First occurrence wins for duplicate labels in ad hoc joins.
            index.entry(lookup_key(name)).or_insert(position);
        }
        Self { names, index }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.index.get(&lookup_key(column)).copied()
    }
}

fn lookup_key(column: &str) -> String {
    column.to_ascii_lowercase()
}

/// In-memory representation of one table record.
#[derive(Debug, Clone)]
pub struct Row {
    table: Option<String>,
    layout: Arc<RowLayout>,
    values: Vec<Value>,
    changed: Vec<bool>,
}

impl Row {
    /// Creates a fresh row: every column null and dirty.
    ///
    /// `table` is `None` for rows produced by ad hoc queries; such rows can be
    /// read but not written back through the executor.
    pub fn new(table: Option<&str>, layout: Arc<RowLayout>) -> Self {
        let width = layout.len();
        Self {
            table: table.map(str::to_string),
            layout,
            values: vec![Value::Null; width],
            changed: vec![true; width],
        }
    }

    /// Canonical table name, if bound.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn column_names(&self) -> &[String] {
        self.layout.names()
    }

    pub fn layout(&self) -> &Arc<RowLayout> {
        &self.layout
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.layout.position(column).is_some()
    }

    fn position(&self, column: &str) -> DbResult<usize> {
        self.layout
            .position(column)
            .ok_or_else(|| DbError::UnknownColumn {
                table: self.table.clone().unwrap_or_default(),
                column: column.to_string(),
            })
    }

    /// Returns the raw stored value.
    pub fn get(&self, column: &str) -> DbResult<&Value> {
        let position = self.position(column)?;
        Ok(&self.values[position])
    }

    pub(crate) fn value_at(&self, position: usize) -> &Value {
        &self.values[position]
    }

    pub fn is_column_null(&self, column: &str) -> DbResult<bool> {
        Ok(self.get(column)?.is_null())
    }

    pub fn get_int(&self, column: &str) -> DbResult<Option<i32>> {
        self.get(column)?.to_int(column)
    }

    pub fn get_long(&self, column: &str) -> DbResult<Option<i64>> {
        self.get(column)?.to_long(column)
    }

    pub fn get_decimal(&self, column: &str) -> DbResult<Option<Decimal>> {
        self.get(column)?.to_decimal(column)
    }

    pub fn get_double(&self, column: &str) -> DbResult<Option<f64>> {
        self.get(column)?.to_double(column)
    }

    /// Reads native booleans and 0/1 integers alike.
    pub fn get_boolean(&self, column: &str) -> DbResult<Option<bool>> {
        self.get(column)?.to_bool(column)
    }

    pub fn get_string(&self, column: &str) -> DbResult<Option<&str>> {
        self.get(column)?.to_str(column)
    }

    pub fn get_date(&self, column: &str) -> DbResult<Option<NaiveDate>> {
        self.get(column)?.to_date(column)
    }

    pub fn get_time(&self, column: &str) -> DbResult<Option<NaiveTime>> {
        self.get(column)?.to_time(column)
    }

    pub fn get_timestamp(&self, column: &str) -> DbResult<Option<NaiveDateTime>> {
        self.get(column)?.to_timestamp(column)
    }

    /// Stores `value`; raises the dirty flag only when the value differs.
    pub fn set_column(&mut self, column: &str, value: impl Into<Value>) -> DbResult<()> {
        let position = self.position(column)?;
        self.set_at(position, value.into());
        Ok(())
    }

    pub fn set_column_null(&mut self, column: &str) -> DbResult<()> {
        self.set_column(column, Value::Null)
    }

    pub(crate) fn set_at(&mut self, position: usize, value: Value) {
        if !self.values[position].same_as(&value) {
            self.values[position] = value;
            self.changed[position] = true;
        }
    }

    pub fn has_column_changed(&self, column: &str) -> DbResult<bool> {
        let position = self.position(column)?;
        Ok(self.changed[position])
    }

    pub(crate) fn changed_at(&self, position: usize) -> bool {
        self.changed[position]
    }

    /// Whether any column is dirty.
    pub fn has_changes(&self) -> bool {
        self.changed.iter().any(|flag| *flag)
    }

    /// Marks the row as synchronized with storage.
    pub fn reset_changed(&mut self) {
        self.changed.iter_mut().for_each(|flag| *flag = false);
    }
}

/// Rows compare column-for-column; dirty flags are not part of equality.
impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
            && self.layout.names() == other.layout.names()
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(left, right)| left.same_as(right))
    }
}

impl Display for Row {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.table.as_deref().unwrap_or("query"))?;
        for (position, name) in self.layout.names().iter().enumerate() {
            if position > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name} = {}", self.values[position])?;
        }
        f.write_str(")")
    }
}
