//! Table schema introspection and identifier safety.
//!
//! # Responsibility
//! - Validate every identifier that is spliced into SQL text.
//! - Cache per-table column descriptors for the process lifetime.
//!
//! # Invariants
//! - Identifier validation is the only injection defense for names; values
//!   are always bound as parameters.

pub mod catalog;
pub mod identifier;

pub use catalog::{ColumnDescriptor, SchemaCatalog, TableSchema};
pub use identifier::{split_qualified, validate_identifier};
