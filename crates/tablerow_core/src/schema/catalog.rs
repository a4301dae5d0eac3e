//! Memoized table schemas built from runtime introspection.
//!
//! # Responsibility
//! - Resolve a table name to its ordered column descriptors on first use.
//! - Identify the table's primary-key column.
//!
//! # Invariants
//! - A loaded schema is never invalidated; the physical schema is assumed
//!   static while the process runs.
//! - Failed loads are not cached.
//! - Every table and column name in a cached schema passed
//!   `validate_identifier`.

use super::identifier::{split_qualified, validate_identifier};
use crate::db::{Backend, DbError, DbResult};
use crate::dialect::Dialect;
use crate::memo::OnceMap;
use crate::model::{RowLayout, SqlType};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;

/// One column of a table schema. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Name as reported by the backend.
    pub name: String,
    /// Name folded to the dialect's identifier case.
    pub canonical_name: String,
    pub sql_type: SqlType,
    pub primary_key: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnDescriptor>,
    primary_key: Option<usize>,
    layout: Arc<RowLayout>,
}

impl TableSchema {
    fn new(name: String, columns: Vec<ColumnDescriptor>, primary_key: Option<usize>) -> Self {
        let layout = Arc::new(RowLayout::new(
            columns.iter().map(|column| column.canonical_name.clone()),
        ));
        Self {
            name,
            columns,
            primary_key,
            layout,
        }
    }

    /// Canonical, possibly schema-qualified, table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.position(name).map(|position| &self.columns[position])
    }

    /// Case-insensitive position of `name` in column order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.layout.position(name)
    }

    pub fn primary_key(&self) -> Option<&ColumnDescriptor> {
        self.primary_key.map(|position| &self.columns[position])
    }

    pub fn primary_key_position(&self) -> Option<usize> {
        self.primary_key
    }

    /// Shared layout for rows of this table.
    pub fn layout(&self) -> &Arc<RowLayout> {
        &self.layout
    }
}

/// Process-wide table schema cache, owned by the process root and passed by
/// reference to every consumer.
pub struct SchemaCatalog {
    dialect: Arc<dyn Dialect>,
    default_schema: Option<String>,
    tables: OnceMap<TableSchema>,
}

impl SchemaCatalog {
    /// `default_schema` qualifies introspection of unqualified table names.
    pub fn new(dialect: Arc<dyn Dialect>, default_schema: Option<String>) -> Self {
        let default_schema = default_schema.map(|schema| dialect.canonicalize(&schema));
        Self {
            dialect,
            default_schema,
            tables: OnceMap::new(),
        }
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    /// Folds `table` to the dialect's case and checks it is safe to splice.
    pub fn canonical_table(&self, table: &str) -> DbResult<String> {
        let canonical = self.dialect.canonicalize(table);
        split_qualified(&canonical)?;
        Ok(canonical)
    }

    /// Returns the cached schema for `table`, introspecting it on first use.
    pub fn columns(&self, backend: &dyn Backend, table: &str) -> DbResult<Arc<TableSchema>> {
        let canonical = self.canonical_table(table)?;
        self.tables
            .get_or_try_init(&canonical, || self.load(backend, &canonical))
    }

    /// First primary-key column of `table`, if it has one.
    pub fn primary_key_column(
        &self,
        backend: &dyn Backend,
        table: &str,
    ) -> DbResult<Option<ColumnDescriptor>> {
        Ok(self.columns(backend, table)?.primary_key().cloned())
    }

    /// Canonical names of every table loaded so far, sorted.
    pub fn cached_tables(&self) -> Vec<String> {
        self.tables.loaded_keys()
    }

    fn load(&self, backend: &dyn Backend, canonical: &str) -> DbResult<TableSchema> {
        let started_at = Instant::now();
        match self.introspect(backend, canonical) {
            Ok(schema) => {
                info!(
                    "event=catalog_load module=schema status=ok table={} columns={} primary_key={} duration_ms={}",
                    canonical,
                    schema.columns.len(),
                    schema.primary_key().map_or("none", |column| column.canonical_name.as_str()),
                    started_at.elapsed().as_millis()
                );
                Ok(schema)
            }
            Err(err) => {
                error!(
                    "event=catalog_load module=schema status=error table={} duration_ms={} error_code=catalog_load_failed error={}",
                    canonical,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn introspect(&self, backend: &dyn Backend, canonical: &str) -> DbResult<TableSchema> {
        let (schema, table) = split_qualified(canonical)?;
        let schema = schema.or(self.default_schema.as_deref());

        let keys = backend.primary_key_columns(schema, table)?;
        let metas = backend.table_columns(schema, table)?;
        if metas.is_empty() {
            return Err(DbError::UnknownTable(canonical.to_string()));
        }
        if keys.len() > 1 {
            warn!(
                "event=catalog_load module=schema status=warn table={} error_code=composite_primary_key key_columns={} using={}",
                canonical,
                keys.len(),
                keys[0]
            );
        }

        let mut columns = Vec::with_capacity(metas.len());
        for meta in metas {
            validate_identifier(&meta.name)?;
            let primary_key = keys.iter().any(|key| key.eq_ignore_ascii_case(&meta.name));
            columns.push(ColumnDescriptor {
                canonical_name: self.dialect.canonicalize(&meta.name),
                name: meta.name,
                sql_type: meta.sql_type,
                primary_key,
            });
        }
        let primary_key = keys.first().and_then(|key| {
            columns
                .iter()
                .position(|column| column.name.eq_ignore_ascii_case(key))
        });

        Ok(TableSchema::new(canonical.to_string(), columns, primary_key))
    }
}
