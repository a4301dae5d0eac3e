//! Connection plumbing and the crate-wide storage error.
//!
//! # Responsibility
//! - Define the backend driver seam (`Backend`, `PreparedStatement`,
//!   `ResultStream`) and its SQLite implementation.
//! - Supply pooled connections and detect the active dialect once.
//! - Bootstrap a process-level `Database` from configuration.
//!
//! # Invariants
//! - Connectivity errors are propagated unmodified and never retried here.
//! - Schema and coercion failures surface as typed `DbError` variants, never
//!   as silent defaults.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod backend;
mod open;
pub mod provider;
pub mod sqlite;

pub use backend::{Backend, ColumnMeta, PreparedStatement, ResultStream};
pub use open::{open_database, Database, DatabaseInfo};
pub use provider::{ConnectionProvider, PoolState};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    /// SQLite driver failure.
    Sqlite(rusqlite::Error),
    /// Pool exhaustion or checkout timeout.
    Pool(r2d2::Error),
    /// Failure reported by a non-SQLite `Backend` implementation.
    Driver(Box<dyn Error + Send + Sync>),
    /// Product name did not match any supported dialect.
    UnsupportedBackend(String),
    Config(String),
    /// Identifier failed the splice-safety pattern.
    InvalidIdentifier(String),
    UnknownTable(String),
    UnknownColumn {
        table: String,
        column: String,
    },
    NoPrimaryKey(String),
    /// Row-based write attempted on a row that came from an ad hoc query.
    UnboundRow,
    NullPrimaryKey(String),
    /// Stored value cannot be represented by the requested type.
    Coercion {
        column: String,
        target: &'static str,
        value: String,
    },
    /// Backend type code with no bind/extract routine.
    UnsupportedType {
        column: String,
        sql_type: String,
    },
    UnsupportedParameter {
        index: usize,
        kind: &'static str,
    },
    /// Positional parameters cannot carry SQL null.
    NullParameter(usize),
    KeyGeneration(String),
    CursorExhausted,
    CursorClosed,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Pool(err) => write!(f, "connection pool error: {err}"),
            Self::Driver(err) => write!(f, "backend driver error: {err}"),
            Self::UnsupportedBackend(product) => {
                write!(f, "unsupported database backend `{product}`")
            }
            Self::Config(message) => write!(f, "invalid database configuration: {message}"),
            Self::InvalidIdentifier(name) => write!(
                f,
                "identifier `{name}` contains characters other than letters, digits, `_` and `.`"
            ),
            Self::UnknownTable(table) => write!(f, "unknown table `{table}`"),
            Self::UnknownColumn { table, column } => {
                write!(f, "unknown column `{column}` in table `{table}`")
            }
            Self::NoPrimaryKey(table) => write!(f, "table `{table}` has no primary key column"),
            Self::UnboundRow => write!(f, "row is not bound to a table"),
            Self::NullPrimaryKey(table) => {
                write!(f, "primary key value is null for row in `{table}`")
            }
            Self::Coercion {
                column,
                target,
                value,
            } => write!(f, "column `{column}` value `{value}` cannot be read as {target}"),
            Self::UnsupportedType { column, sql_type } => {
                write!(f, "unsupported type `{sql_type}` for column `{column}`")
            }
            Self::UnsupportedParameter { index, kind } => {
                write!(f, "parameter {index} has unsupported type {kind}")
            }
            Self::NullParameter(index) => {
                write!(f, "parameter {index} is null; bind nulls through a row column")
            }
            Self::KeyGeneration(table) => {
                write!(f, "key generation returned no value for `{table}`")
            }
            Self::CursorExhausted => write!(f, "cursor has no more rows"),
            Self::CursorClosed => write!(f, "cursor is closed"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Pool(err) => Some(err),
            Self::Driver(err) => {
                let err: &(dyn Error + 'static) = err.as_ref();
                Some(err)
            }
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<r2d2::Error> for DbError {
    fn from(value: r2d2::Error) -> Self {
        Self::Pool(value)
    }
}
