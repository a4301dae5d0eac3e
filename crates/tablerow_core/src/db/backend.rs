//! Driver seam between the persistence core and one live connection.
//!
//! # Responsibility
//! - Expose the backend schema introspection calls the catalog needs.
//! - Expose prepared statements with 1-based positional binding.
//! - Expose forward-only result streams that own their statement.
//!
//! # Invariants
//! - `ResultStream::close` releases the result, then the statement, and is
//!   idempotent.
//! - Drivers never interpret values beyond their wire representation;
//!   typed extraction happens in `repo::convert`.

use super::DbResult;
use crate::model::{SqlType, Value};
use log::warn;

/// One result or table column as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub sql_type: SqlType,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// One live backend connection.
pub trait Backend {
    /// Product name string used for dialect detection.
    fn product_name(&self) -> DbResult<String>;

    /// Primary-key column names of `table`, in key order.
    fn primary_key_columns(&self, schema: Option<&str>, table: &str) -> DbResult<Vec<String>>;

    /// All columns of `table`, in declaration order. Empty when the table
    /// does not exist.
    fn table_columns(&self, schema: Option<&str>, table: &str) -> DbResult<Vec<ColumnMeta>>;

    fn prepare<'c>(&'c self, sql: &str) -> DbResult<Box<dyn PreparedStatement<'c> + 'c>>;
}

pub trait PreparedStatement<'c> {
    /// Binds `value` to the 1-based placeholder `index`.
    fn bind(&mut self, index: usize, value: &Value) -> DbResult<()>;

    /// Runs a non-query statement and returns the affected row count.
    fn execute_update(&mut self) -> DbResult<usize>;

    /// Runs a query. The returned stream owns this statement.
    fn execute_query(self: Box<Self>) -> DbResult<Box<dyn ResultStream + 'c>>;

    fn close(self: Box<Self>) -> DbResult<()>;
}

pub trait ResultStream {
    fn columns(&self) -> &[ColumnMeta];

    /// Next raw row, or `None` at end of data.
    fn next_row(&mut self) -> DbResult<Option<Vec<Value>>>;

    fn close(&mut self) -> DbResult<()>;

    fn is_closed(&self) -> bool;
}

/// Joins a primary outcome with the result of closing a secondary resource.
///
/// A close failure is returned only when the primary outcome succeeded;
/// otherwise it is logged and the primary error wins.
pub(crate) fn with_cleanup<T>(
    primary: DbResult<T>,
    cleanup: DbResult<()>,
    resource: &str,
) -> DbResult<T> {
    match (primary, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(
                "event=resource_close module=db status=warn resource={} error_code=close_failed_after_error error={} primary_error={}",
                resource, close_err, err
            );
            Err(err)
        }
    }
}
