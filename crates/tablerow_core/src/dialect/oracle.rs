//! Oracle: upper-case identifiers, `<TABLE>_SEQ` keys fetched up front and
//! `ROWNUM` pagination.

use super::{
    bound, placeholders, BooleanStorage, Dialect, IdentifierCase, InsertSql, KeyStrategy,
    PagedSql,
};
use crate::model::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn identifier_case(&self) -> IdentifierCase {
        IdentifierCase::Upper
    }

    fn boolean_storage(&self) -> BooleanStorage {
        BooleanStorage::Integer
    }

    // NUMBER columns come back as arbitrary-width integers.
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
            key_query: Some(format!("SELECT {table}_SEQ.NEXTVAL FROM DUAL")),
            insert: format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                names.join(", "),
                placeholders(names.len())
            ),
        }
    }

    fn paginate(&self, sql: &str, offset: u32, limit: Option<u32>) -> PagedSql {
        let numbered = |filter: &str| {
            format!("SELECT * FROM (SELECT rec.*, ROWNUM rnum FROM ({sql}) rec{filter})")
        };
        match limit {
            Some(limit) if offset > 0 => PagedSql {
                sql: format!("{} WHERE rnum > ?", numbered(" WHERE ROWNUM <= ?")),
                params: vec![
                    Value::Long(i64::from(offset) + i64::from(limit)),
                    bound(offset),
                ],
            },
            Some(limit) => PagedSql {
                sql: numbered(" WHERE ROWNUM <= ?"),
                params: vec![bound(limit)],
            },
            None if offset > 0 => PagedSql {
                sql: format!("{} WHERE rnum > ?", numbered("")),
                params: vec![bound(offset)],
            },
            None => PagedSql {
                sql: sql.to_string(),
                params: Vec::new(),
            },
        }
    }

    fn validation_query(&self) -> &'static str {
        "SELECT 1 FROM DUAL"
    }
}
