//! Generic relational persistence core.
//!
//! Schema-introspecting row mapping over pooled connections: a memoized
//! schema catalog, dirty-tracked rows, per-backend SQL dialects, a query
//! executor and lazy result cursors.

pub mod config;
pub mod db;
pub mod dialect;
pub mod logging;
mod memo;
pub mod model;
pub mod repo;
pub mod schema;

pub use config::DbConfig;
pub use db::{open_database, Backend, ConnectionProvider, Database, DatabaseInfo, DbError, DbResult};
pub use dialect::Dialect;
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status};
pub use model::{Row, SqlType, Value};
pub use repo::{QueryExecutor, ResultCursor};
pub use schema::{ColumnDescriptor, SchemaCatalog, TableSchema};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
