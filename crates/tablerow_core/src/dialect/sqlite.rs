//! SQLite: embedded backend with 0/1 booleans and `MAX(pk) + 1` keys.

use super::{
    bound, placeholders, BooleanStorage, Dialect, IdentifierCase, InsertSql, KeyStrategy,
    PagedSql,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn identifier_case(&self) -> IdentifierCase {
        IdentifierCase::Lower
    }

    fn boolean_storage(&self) -> BooleanStorage {
        BooleanStorage::Integer
    }

    // Every integer is stored as a 64-bit value.
    fn wide_integers(&self) -> bool {
        true
    }

    fn key_strategy(&self) -> KeyStrategy {
        KeyStrategy::SeparateQuery
    }

    fn build_insert(&self, table: &str, primary_key: &str, columns: &[&str]) -> InsertSql {
        let mut names = vec![primary_key];
        names.extend_from_slice(columns);
        InsertSql {
            key_query: Some(format!(
                "SELECT COALESCE(MAX({primary_key}), 0) + 1 FROM {table}"
            )),
            insert: format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                names.join(", "),
                placeholders(names.len())
            ),
        }
    }

    fn paginate(&self, sql: &str, offset: u32, limit: Option<u32>) -> PagedSql {
        match limit {
            Some(limit) => PagedSql {
                sql: format!("{sql} LIMIT ? OFFSET ?"),
                params: vec![bound(limit), bound(offset)],
            },
            None if offset > 0 => PagedSql {
                sql: format!("{sql} LIMIT -1 OFFSET ?"),
                params: vec![bound(offset)],
            },
            None => PagedSql {
                sql: sql.to_string(),
                params: Vec::new(),
            },
        }
    }

    fn validation_query(&self) -> &'static str {
        "SELECT 1"
    }
}
