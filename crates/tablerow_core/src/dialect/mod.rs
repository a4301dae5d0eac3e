//! Backend dialect strategy.
//!
//! # Responsibility
//! - Detect the active backend once from its product name.
//! - Answer every backend-specific question the catalog and executor ask:
//!   identifier case, boolean storage, integer width, key generation and
//!   pagination shape.
//!
//! # Invariants
//! - The set of dialects is closed; an unrecognized product is a startup error.
//! - Dialects only splice identifiers that already passed
//!   `schema::validate_identifier`; values, offsets and limits are always bound.
//!
//! # See also
//! - `repo::executor` for how insert plans and pages are executed.

use crate::db::{DbError, DbResult};
use crate::model::Value;
use log::{error, info};
use std::fmt::Debug;
use std::sync::Arc;

mod oracle;
mod postgres;
mod sqlite;

pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

/// Letter case a backend folds unquoted identifiers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierCase {
    Upper,
    Lower,
}

/// Physical representation of boolean columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanStorage {
    Native,
    /// `0` / `1` in an integer column.
    Integer,
}

/// How `create` acquires a primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// The insert embeds a key expression and returns the generated key.
    Returning,
    /// A key query runs first; the insert binds the key as parameter 1.
    SeparateQuery,
}

/// Insert text for one table, built once and reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertSql {
    /// Key-generation query for two-round-trip dialects.
    pub key_query: Option<String>,
    /// Insert statement. Binds the key first when `key_query` is set; returns
    /// the key as its single result column otherwise.
    pub insert: String,
}

/// A caller query rewritten for one page plus the trailing parameters it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PagedSql {
    pub sql: String,
    pub params: Vec<Value>,
}

pub trait Dialect: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn identifier_case(&self) -> IdentifierCase;

    fn boolean_storage(&self) -> BooleanStorage;

    /// Whether integer columns are read into 64-bit values.
    fn wide_integers(&self) -> bool;

    fn key_strategy(&self) -> KeyStrategy;

    /// Builds the insert for `table`. `columns` lists the non-key columns in
    /// schema order; their placeholders follow the key placeholder, if any.
    fn build_insert(&self, table: &str, primary_key: &str, columns: &[&str]) -> InsertSql;

    /// Applies this backend's pagination shape to `sql`.
    fn paginate(&self, sql: &str, offset: u32, limit: Option<u32>) -> PagedSql;

    /// Cheap statement used to validate pooled connections.
    fn validation_query(&self) -> &'static str;

    fn canonicalize(&self, identifier: &str) -> String {
        match self.identifier_case() {
            IdentifierCase::Upper => identifier.to_ascii_uppercase(),
            IdentifierCase::Lower => identifier.to_ascii_lowercase(),
        }
    }
}

/// Selects a dialect by case-insensitive substring match on `product_name`.
pub fn detect(product_name: &str) -> DbResult<Arc<dyn Dialect>> {
    let product = product_name.to_ascii_lowercase();
    let dialect: Arc<dyn Dialect> = if product.contains("postgres") {
        Arc::new(PostgresDialect)
    } else if product.contains("oracle") {
        Arc::new(OracleDialect)
    } else if product.contains("sqlite") {
        Arc::new(SqliteDialect)
    } else {
        error!(
            "event=dialect_detect module=dialect status=error error_code=unsupported_backend product={}",
            product_name
        );
        return Err(DbError::UnsupportedBackend(product_name.to_string()));
    };
    info!(
        "event=dialect_detect module=dialect status=ok dialect={} product={}",
        dialect.name(),
        product_name
    );
    Ok(dialect)
}

/// Placeholder list `?, ?, ...` of length `count`.
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn bound(value: u32) -> Value {
    Value::Long(i64::from(value))
}
