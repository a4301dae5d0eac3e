//! PostgreSQL: native booleans, sequence-backed keys returned by the insert.

use super::{
    bound, placeholders, BooleanStorage, Dialect, IdentifierCase, InsertSql, KeyStrategy,
    PagedSql,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn identifier_case(&self) -> IdentifierCase {
        IdentifierCase::Lower
    }

    fn boolean_storage(&self) -> BooleanStorage {
        BooleanStorage::Native
    }

    fn wide_integers(&self) -> bool {
        false
    }

    fn key_strategy(&self) -> KeyStrategy {
        KeyStrategy::Returning
    }

    fn build_insert(&self, table: &str, primary_key: &str, columns: &[&str]) -> InsertSql {
        let mut names = vec![primary_key];
        names.extend_from_slice(columns);
        let mut values = format!("nextval('{table}_seq')");
        if !columns.is_empty() {
            values.push_str(", ");
            values.push_str(&placeholders(columns.len()));
        }
        InsertSql {
            key_query: None,
            insert: format!(
                "INSERT INTO {table} ({}) VALUES ({values}) RETURNING {primary_key}",
                names.join(", ")
            ),
        }
    }

    fn paginate(&self, sql: &str, offset: u32, limit: Option<u32>) -> PagedSql {
        match limit {
            Some(limit) => PagedSql {
                sql: format!("{sql} OFFSET ? LIMIT ?"),
                params: vec![bound(offset), bound(limit)],
            },
            None if offset > 0 => PagedSql {
                sql: format!("{sql} OFFSET ?"),
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
