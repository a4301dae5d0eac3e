//! Query execution and result cursors.
//!
//! # Responsibility
//! - Turn row operations and caller SQL into parameterized statements.
//! - Materialize results into `Row` values, eagerly or through a cursor.
//!
//! # Invariants
//! - Positional parameters never carry SQL null.
//! - Cursors own their statement; closing one releases both.
//!
//! # See also
//! - `schema::catalog` for the column metadata every write is built from.

mod convert;
pub mod cursor;
pub mod executor;

pub use cursor::ResultCursor;
pub use executor::QueryExecutor;
