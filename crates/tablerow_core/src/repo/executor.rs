//! Row-level CRUD and parameterized queries over one connection.
//!
//! # Responsibility
//! - Build and run SQL for create/find/update/delete from the schema catalog
//!   and the active dialect.
//! - Run caller SQL with positional parameters and hand back cursors.
//!
//! # Invariants
//! - Identifiers come from the catalog (already validated); every value is a
//!   bound parameter.
//! - Insert text is built once per table and reused.
//! - Not-found is `Ok(None)` / `Ok(0)`, never an error.
//! - Transactions are the caller's; nothing here commits or rolls back.

use super::convert::{check_parameter, column_value, extract, render_params};
use super::cursor::ResultCursor;
use crate::db::backend::{with_cleanup, Backend, PreparedStatement, ResultStream};
use crate::db::{DbError, DbResult};
use crate::dialect::{Dialect, PagedSql};
use crate::memo::OnceMap;
use crate::model::{Row, Value};
use crate::schema::{ColumnDescriptor, SchemaCatalog, TableSchema};
use log::{debug, error};
use std::sync::Arc;
use std::time::Instant;

/// Cached insert for one table.
#[derive(Debug)]
struct InsertPlan {
    key_query: Option<String>,
    insert: String,
    /// Non-key row positions in placeholder order.
    columns: Vec<usize>,
}

pub struct QueryExecutor {
    catalog: Arc<SchemaCatalog>,
    inserts: OnceMap<InsertPlan>,
}

impl QueryExecutor {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            catalog,
            inserts: OnceMap::new(),
        }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        self.catalog.dialect()
    }

    /// Fresh, unsaved row bound to `table`: all columns null and dirty.
    pub fn row(&self, conn: &dyn Backend, table: &str) -> DbResult<Row> {
        let schema = self.catalog.columns(conn, table)?;
        Ok(Row::new(Some(schema.name()), Arc::clone(schema.layout())))
    }

    /// Inserts a fresh row into `table` and returns it with its generated key.
    pub fn create(&self, conn: &dyn Backend, table: &str) -> DbResult<Row> {
        let mut row = self.row(conn, table)?;
        self.insert(conn, &mut row)?;
        Ok(row)
    }

    /// Inserts `row` under a newly generated key and stores the key on it.
    ///
    /// Dirty flags are left as they were.
    pub fn insert(&self, conn: &dyn Backend, row: &mut Row) -> DbResult<()> {
        let schema = self.bound_schema(conn, row)?;
        let (key_position, key) = require_primary_key(&schema)?;
        let plan = self
            .inserts
            .get_or_try_init(schema.name(), || Ok::<_, DbError>(self.build_insert(&schema, key)))?;

        let mut binds = Vec::with_capacity(plan.columns.len() + 1);
        let generated = match &plan.key_query {
            Some(key_query) => {
                let generated = self.next_key(conn, &schema, key, key_query)?;
                binds.push(column_value(
                    self.dialect().as_ref(),
                    &key.canonical_name,
                    &key.sql_type,
                    &generated,
                )?);
                binds.extend(self.row_binds(&schema, row, &plan.columns)?);
                let affected = self.execute(conn, &plan.insert, &binds)?;
                if affected == 0 {
                    return Err(DbError::KeyGeneration(schema.name().to_string()));
                }
                generated
            }
            None => {
                binds.extend(self.row_binds(&schema, row, &plan.columns)?);
                let mut stream = self.open_stream(conn, &plan.insert, &binds)?;
                let returned = first_value(stream.as_mut());
                let returned = with_cleanup(returned, stream.close(), "insert_returning")?;
                self.generated_key(&schema, key, returned)?
            }
        };
        row.set_at(key_position, generated);
        Ok(())
    }

    /// Writes the row's dirty non-key columns.
    ///
    /// Returns `Ok(1)` without touching storage when nothing is dirty, and
    /// `Ok(0)` when the key no longer matches a stored row. Dirty flags are
    /// cleared after a write that matched a row.
    pub fn update(&self, conn: &dyn Backend, row: &mut Row) -> DbResult<usize> {
        let schema = self.bound_schema(conn, row)?;
        let (key_position, key) = require_primary_key(&schema)?;
        if row.value_at(key_position).is_null() {
            return Err(DbError::NullPrimaryKey(schema.name().to_string()));
        }

        let dirty: Vec<usize> = (0..schema.columns().len())
            .filter(|position| *position != key_position && row.changed_at(*position))
            .collect();
        if dirty.is_empty() {
            debug!(
                "event=row_update module=repo status=skip table={} reason=no_dirty_columns",
                schema.name()
            );
            return Ok(1);
        }

        let assignments: Vec<String> = dirty
            .iter()
            .map(|position| format!("{} = ?", schema.columns()[*position].canonical_name))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            schema.name(),
            assignments.join(", "),
            key.canonical_name
        );
        let mut binds = self.row_binds(&schema, row, &dirty)?;
        binds.push(self.key_bind(&schema, key, row.value_at(key_position))?);

        let affected = self.execute(conn, &sql, &binds)?;
        if affected > 0 {
            row.reset_changed();
        }
        Ok(affected)
    }

    /// Deletes the row of `table` whose primary key is `key`.
    pub fn delete(&self, conn: &dyn Backend, table: &str, key: impl Into<Value>) -> DbResult<usize> {
        let schema = self.catalog.columns(conn, table)?;
        let (_, primary_key) = require_primary_key(&schema)?;
        let key = self.key_bind(&schema, primary_key, &key.into())?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            schema.name(),
            primary_key.canonical_name
        );
        self.execute(conn, &sql, &[key])
    }

    /// Deletes `row` by its primary key, which must be set.
    pub fn delete_row(&self, conn: &dyn Backend, row: &Row) -> DbResult<usize> {
        let schema = self.bound_schema(conn, row)?;
        let (key_position, _) = require_primary_key(&schema)?;
        self.delete(conn, schema.name(), row.value_at(key_position).clone())
    }

    /// Deletes every row of `table` whose `column` equals `value`.
    pub fn delete_by_value(
        &self,
        conn: &dyn Backend,
        table: &str,
        column: &str,
        value: impl Into<Value>,
    ) -> DbResult<usize> {
        let schema = self.catalog.columns(conn, table)?;
        let descriptor = require_column(&schema, column)?;
        let value = self.filter_bind(descriptor, &value.into())?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            schema.name(),
            descriptor.canonical_name
        );
        self.execute(conn, &sql, &[value])
    }

    /// Loads the row of `table` whose primary key is `key`.
    pub fn find(
        &self,
        conn: &dyn Backend,
        table: &str,
        key: impl Into<Value>,
    ) -> DbResult<Option<Row>> {
        let schema = self.catalog.columns(conn, table)?;
        let (_, primary_key) = require_primary_key(&schema)?;
        let key = self.key_bind(&schema, primary_key, &key.into())?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?",
            schema.name(),
            primary_key.canonical_name
        );
        self.tagged_cursor(conn, &schema, &sql, &[key])?.first()
    }

    /// Loads the first row of `table` whose `column` equals `value`.
    ///
    /// Additional matches are ignored.
    pub fn find_by_unique(
        &self,
        conn: &dyn Backend,
        table: &str,
        column: &str,
        value: impl Into<Value>,
    ) -> DbResult<Option<Row>> {
        let schema = self.catalog.columns(conn, table)?;
        let descriptor = require_column(&schema, column)?;
        let value = self.filter_bind(descriptor, &value.into())?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?",
            schema.name(),
            descriptor.canonical_name
        );
        self.tagged_cursor(conn, &schema, &sql, &[value])?.first()
    }

    /// Runs an ad hoc query; row columns come from the result metadata.
    pub fn query<'c>(
        &self,
        conn: &'c dyn Backend,
        sql: &str,
        params: &[Value],
    ) -> DbResult<ResultCursor<'c>> {
        check_parameters(params)?;
        let stream = self.open_stream(conn, sql, params)?;
        Ok(ResultCursor::untagged(stream, Arc::clone(self.dialect())))
    }

    /// Runs a query whose rows belong to `table`; column types come from the
    /// cached schema.
    pub fn query_table<'c>(
        &self,
        conn: &'c dyn Backend,
        table: &str,
        sql: &str,
        params: &[Value],
    ) -> DbResult<ResultCursor<'c>> {
        check_parameters(params)?;
        let schema = self.catalog.columns(conn, table)?;
        self.tagged_cursor(conn, &schema, sql, params)
    }

    /// First row of an ad hoc query, if any.
    pub fn query_single(
        &self,
        conn: &dyn Backend,
        sql: &str,
        params: &[Value],
    ) -> DbResult<Option<Row>> {
        self.query(conn, sql, params)?.first()
    }

    /// First row of a query over `table`, if any.
    pub fn query_single_table(
        &self,
        conn: &dyn Backend,
        table: &str,
        sql: &str,
        params: &[Value],
    ) -> DbResult<Option<Row>> {
        self.query_table(conn, table, sql, params)?.first()
    }

    /// Runs `sql` over `table` restricted to one page.
    ///
    /// Offset and limit are appended after `params` as bound parameters.
    pub fn query_table_page<'c>(
        &self,
        conn: &'c dyn Backend,
        table: &str,
        sql: &str,
        params: &[Value],
        offset: u32,
        limit: Option<u32>,
    ) -> DbResult<ResultCursor<'c>> {
        check_parameters(params)?;
        let schema = self.catalog.columns(conn, table)?;
        let PagedSql {
            sql: paged,
            params: page_params,
        } = self.dialect().paginate(sql, offset, limit);
        let mut binds = params.to_vec();
        binds.extend(page_params);
        self.tagged_cursor(conn, &schema, &paged, &binds)
    }

    /// Runs a non-query statement and returns the affected row count.
    pub fn update_query(&self, conn: &dyn Backend, sql: &str, params: &[Value]) -> DbResult<usize> {
        check_parameters(params)?;
        self.execute(conn, sql, params)
    }

    fn bound_schema(&self, conn: &dyn Backend, row: &Row) -> DbResult<Arc<TableSchema>> {
        let table = row.table().ok_or(DbError::UnboundRow)?;
        self.catalog.columns(conn, table)
    }

    fn build_insert(&self, schema: &TableSchema, key: &ColumnDescriptor) -> InsertPlan {
        let columns: Vec<usize> = schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| !column.primary_key)
            .map(|(position, _)| position)
            .collect();
        let names: Vec<&str> = columns
            .iter()
            .map(|position| schema.columns()[*position].canonical_name.as_str())
            .collect();
        let sql = self
            .dialect()
            .build_insert(schema.name(), &key.canonical_name, &names);
        debug!(
            "event=insert_plan module=repo status=ok table={} key_query={} sql={}",
            schema.name(),
            sql.key_query.is_some(),
            sql.insert
        );
        InsertPlan {
            key_query: sql.key_query,
            insert: sql.insert,
            columns,
        }
    }

    fn next_key(
        &self,
        conn: &dyn Backend,
        schema: &TableSchema,
        key: &ColumnDescriptor,
        key_query: &str,
    ) -> DbResult<Value> {
        let mut stream = self.open_stream(conn, key_query, &[])?;
        let fetched = first_value(stream.as_mut());
        let fetched = with_cleanup(fetched, stream.close(), "key_query")?;
        self.generated_key(schema, key, fetched)
    }

    fn generated_key(
        &self,
        schema: &TableSchema,
        key: &ColumnDescriptor,
        raw: Option<Value>,
    ) -> DbResult<Value> {
        match raw {
            Some(raw) if !raw.is_null() => extract(
                self.dialect().as_ref(),
                &key.canonical_name,
                &key.sql_type,
                raw,
            ),
            _ => Err(DbError::KeyGeneration(schema.name().to_string())),
        }
    }

    fn row_binds(&self, schema: &TableSchema, row: &Row, positions: &[usize]) -> DbResult<Vec<Value>> {
        positions
            .iter()
            .map(|position| {
                let column = &schema.columns()[*position];
                column_value(
                    self.dialect().as_ref(),
                    &column.canonical_name,
                    &column.sql_type,
                    row.value_at(*position),
                )
            })
            .collect()
    }

    fn key_bind(&self, schema: &TableSchema, key: &ColumnDescriptor, value: &Value) -> DbResult<Value> {
        if value.is_null() {
            return Err(DbError::NullPrimaryKey(schema.name().to_string()));
        }
        column_value(self.dialect().as_ref(), &key.canonical_name, &key.sql_type, value)
    }

    fn filter_bind(&self, column: &ColumnDescriptor, value: &Value) -> DbResult<Value> {
        if value.is_null() {
            return Err(DbError::NullParameter(1));
        }
        column_value(self.dialect().as_ref(), &column.canonical_name, &column.sql_type, value)
    }

    fn tagged_cursor<'c>(
        &self,
        conn: &'c dyn Backend,
        schema: &TableSchema,
        sql: &str,
        binds: &[Value],
    ) -> DbResult<ResultCursor<'c>> {
        let stream = self.open_stream(conn, sql, binds)?;
        Ok(ResultCursor::tagged(stream, Arc::clone(self.dialect()), schema))
    }

    fn open_stream<'c>(
        &self,
        conn: &'c dyn Backend,
        sql: &str,
        binds: &[Value],
    ) -> DbResult<Box<dyn ResultStream + 'c>> {
        let started_at = Instant::now();
        debug!(
            "event=query module=repo status=start sql={} params={}",
            sql,
            render_params(binds)
        );
        let mut statement = conn.prepare(sql)?;
        if let Err(err) = bind_all(statement.as_mut(), binds) {
            return with_cleanup(Err(err), statement.close(), "statement");
        }
        match statement.execute_query() {
            Ok(stream) => {
                debug!(
                    "event=query module=repo status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(stream)
            }
            Err(err) => {
                error!(
                    "event=query module=repo status=error duration_ms={} error_code=query_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn execute(&self, conn: &dyn Backend, sql: &str, binds: &[Value]) -> DbResult<usize> {
        let started_at = Instant::now();
        debug!(
            "event=execute module=repo status=start sql={} params={}",
            sql,
            render_params(binds)
        );
        let mut statement = conn.prepare(sql)?;
        let outcome = bind_all(statement.as_mut(), binds).and_then(|()| statement.execute_update());
        match with_cleanup(outcome, statement.close(), "statement") {
            Ok(affected) => {
                debug!(
                    "event=execute module=repo status=ok affected={} duration_ms={}",
                    affected,
                    started_at.elapsed().as_millis()
                );
                Ok(affected)
            }
            Err(err) => {
                error!(
                    "event=execute module=repo status=error duration_ms={} error_code=execute_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }
}

fn require_primary_key(schema: &TableSchema) -> DbResult<(usize, &ColumnDescriptor)> {
    schema
        .primary_key_position()
        .map(|position| (position, &schema.columns()[position]))
        .ok_or_else(|| DbError::NoPrimaryKey(schema.name().to_string()))
}

fn require_column<'s>(schema: &'s TableSchema, column: &str) -> DbResult<&'s ColumnDescriptor> {
    schema.column(column).ok_or_else(|| DbError::UnknownColumn {
        table: schema.name().to_string(),
        column: column.to_string(),
    })
}

fn check_parameters(params: &[Value]) -> DbResult<()> {
    params
        .iter()
        .enumerate()
        .try_for_each(|(index, value)| check_parameter(index + 1, value))
}

fn bind_all<'c>(statement: &mut (dyn PreparedStatement<'c> + 'c), binds: &[Value]) -> DbResult<()> {
    binds
        .iter()
        .enumerate()
        .try_for_each(|(index, value)| statement.bind(index + 1, value))
}

/// First column of the first row, reading no further.
fn first_value(stream: &mut (dyn ResultStream + '_)) -> DbResult<Option<Value>> {
    Ok(stream
        .next_row()?
        .and_then(|row| row.into_iter().next()))
}
