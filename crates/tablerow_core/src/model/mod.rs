//! In-memory record model shared by the catalog, executor and cursor.
//!
//! # Responsibility
//! - Define the tagged column value and backend type codes.
//! - Define the schema-bound, dirty-tracked `Row`.
//!
//! # Invariants
//! - A `Row`'s column set is fixed at construction.
//! - SQL null is `Value::Null`; an absent column is always an error.

pub mod row;
pub mod value;

pub use row::{Row, RowLayout};
pub use value::{SqlType, Value};
