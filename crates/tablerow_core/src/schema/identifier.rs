//! Splice-safety checks for table and column identifiers.
//!
//! Identifiers are the only text ever formatted directly into SQL; values are
//! always bound positionally. Every identifier passes `validate_identifier`
//! before it reaches a SQL string.

use crate::db::{DbError, DbResult};
use once_cell::sync::Lazy;
use regex::Regex;

/// Conservative upper bound across supported backends.
const MAX_IDENTIFIER_LENGTH: usize = 128;

static SAFE_IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.]+$").expect("valid identifier regex"));

/// Rejects anything but letters, digits, `_` and `.`.
pub fn validate_identifier(name: &str) -> DbResult<()> {
    if name.len() > MAX_IDENTIFIER_LENGTH || !SAFE_IDENTIFIER_RE.is_match(name) {
        return Err(DbError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Splits `schema.table` into its parts after validating the whole name.
///
/// Unqualified names yield `(None, name)`. More than one separator, or an
/// empty part, is rejected.
pub fn split_qualified(name: &str) -> DbResult<(Option<&str>, &str)> {
    validate_identifier(name)?;
    match name.split_once('.') {
        None => Ok((None, name)),
        Some((schema, table)) if !schema.is_empty() && !table.is_empty() && !table.contains('.') => {
            Ok((Some(schema), table))
        }
        Some(_) => Err(DbError::InvalidIdentifier(name.to_string())),
    }
}
