#![allow(dead_code)]

use rusqlite::Connection;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tablerow_core::db::{Backend, ColumnMeta, PreparedStatement, ResultStream};
use tablerow_core::dialect::{self, SqliteDialect};
use tablerow_core::{DbError, DbResult, QueryExecutor, SchemaCatalog, Value};

pub const FIXTURE_SCHEMA: &str = "
    CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT);
    CREATE TABLE gadgets (
        id INTEGER PRIMARY KEY,
        flag BOOLEAN,
        qty INTEGER,
        big BIGINT,
        price NUMERIC(10, 2),
        ratio DOUBLE,
        label VARCHAR(64),
        made DATE,
        opens TIME,
        stamp TIMESTAMP
    );
    CREATE TABLE tags (label TEXT);
    INSERT INTO widgets (id, name) VALUES
        (1, 'a'), (2, 'b'), (3, 'c'), (4, 'd'), (5, 'e'), (6, 'f');
";

pub fn fixture_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(FIXTURE_SCHEMA).unwrap();
    conn
}

pub fn sqlite_executor() -> QueryExecutor {
    QueryExecutor::new(Arc::new(SchemaCatalog::new(Arc::new(SqliteDialect), None)))
}

/// Executor for whatever dialect `product` names.
pub fn executor_for(product: &str) -> QueryExecutor {
    let dialect = dialect::detect(product).unwrap();
    QueryExecutor::new(Arc::new(SchemaCatalog::new(dialect, None)))
}

/// Wraps a SQLite connection and records every prepared SQL string.
pub struct CountingBackend<'a> {
    inner: &'a Connection,
    prepared: RefCell<Vec<String>>,
}

impl<'a> CountingBackend<'a> {
    pub fn new(inner: &'a Connection) -> Self {
        Self {
            inner,
            prepared: RefCell::new(Vec::new()),
        }
    }

    pub fn prepared(&self) -> Vec<String> {
        self.prepared.borrow().clone()
    }

    pub fn count(&self) -> usize {
        self.prepared.borrow().len()
    }
}

impl Backend for CountingBackend<'_> {
    fn product_name(&self) -> DbResult<String> {
        Backend::product_name(self.inner)
    }

    fn primary_key_columns(&self, schema: Option<&str>, table: &str) -> DbResult<Vec<String>> {
        Backend::primary_key_columns(self.inner, schema, table)
    }

    fn table_columns(&self, schema: Option<&str>, table: &str) -> DbResult<Vec<ColumnMeta>> {
        Backend::table_columns(self.inner, schema, table)
    }

    fn prepare<'c>(&'c self, sql: &str) -> DbResult<Box<dyn PreparedStatement<'c> + 'c>> {
        self.prepared.borrow_mut().push(sql.to_string());
        let inner: &'c Connection = self.inner;
        Backend::prepare(inner, sql)
    }
}

/// Canned response for the next executed statement.
pub enum Scripted {
    Rows {
        columns: Vec<ColumnMeta>,
        rows: Vec<Vec<Value>>,
        /// Zero-based row fetch that fails instead of returning data.
        fail_at: Option<usize>,
    },
    Affected(usize),
}

impl Scripted {
    pub fn rows(columns: Vec<ColumnMeta>, rows: Vec<Vec<Value>>) -> Self {
        Self::Rows {
            columns,
            rows,
            fail_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub binds: Vec<Value>,
}

/// Backend that reports an arbitrary product name and answers statements
/// from a queue, recording what was executed.
pub struct ScriptedBackend {
    product: String,
    tables: HashMap<String, (Vec<String>, Vec<ColumnMeta>)>,
    responses: RefCell<VecDeque<Scripted>>,
    executed: RefCell<Vec<Executed>>,
    closed_streams: Cell<usize>,
    fail_next_close: Cell<bool>,
}

impl ScriptedBackend {
    pub fn new(product: &str) -> Self {
        Self {
            product: product.to_string(),
            tables: HashMap::new(),
            responses: RefCell::new(VecDeque::new()),
            executed: RefCell::new(Vec::new()),
            closed_streams: Cell::new(0),
            fail_next_close: Cell::new(false),
        }
    }

    pub fn with_table(mut self, name: &str, keys: &[&str], columns: Vec<ColumnMeta>) -> Self {
        let keys = keys.iter().map(|key| key.to_string()).collect();
        self.tables.insert(name.to_string(), (keys, columns));
        self
    }

    pub fn respond(&self, response: Scripted) {
        self.responses.borrow_mut().push_back(response);
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.executed.borrow().clone()
    }

    /// Makes the next stream close report a failure and leave the stream open.
    pub fn fail_next_close(&self) {
        self.fail_next_close.set(true);
    }

    pub fn closed_streams(&self) -> usize {
        self.closed_streams.get()
    }

    fn next_response(&self, sql: &str, binds: &[Value]) -> Scripted {
        self.executed.borrow_mut().push(Executed {
            sql: sql.to_string(),
            binds: binds.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted response for `{sql}`"))
    }
}

impl Backend for ScriptedBackend {
    fn product_name(&self) -> DbResult<String> {
        Ok(self.product.clone())
    }

    fn primary_key_columns(&self, _schema: Option<&str>, table: &str) -> DbResult<Vec<String>> {
        Ok(self
            .tables
            .get(table)
            .map(|(keys, _)| keys.clone())
            .unwrap_or_default())
    }

    fn table_columns(&self, _schema: Option<&str>, table: &str) -> DbResult<Vec<ColumnMeta>> {
        Ok(self
            .tables
            .get(table)
            .map(|(_, columns)| columns.clone())
            .unwrap_or_default())
    }

    fn prepare<'c>(&'c self, sql: &str) -> DbResult<Box<dyn PreparedStatement<'c> + 'c>> {
        Ok(Box::new(ScriptedStatement {
            backend: self,
            sql: sql.to_string(),
            binds: Vec::new(),
        }))
    }
}

struct ScriptedStatement<'c> {
    backend: &'c ScriptedBackend,
    sql: String,
    binds: Vec<Value>,
}

impl<'c> PreparedStatement<'c> for ScriptedStatement<'c> {
    fn bind(&mut self, index: usize, value: &Value) -> DbResult<()> {
        if self.binds.len() < index {
            self.binds.resize(index, Value::Null);
        }
        self.binds[index - 1] = value.clone();
        Ok(())
    }

    fn execute_update(&mut self) -> DbResult<usize> {
        match self.backend.next_response(&self.sql, &self.binds) {
            Scripted::Affected(count) => Ok(count),
            Scripted::Rows { .. } => panic!("`{}` expected an update count", self.sql),
        }
    }

    fn execute_query(self: Box<Self>) -> DbResult<Box<dyn ResultStream + 'c>> {
        match self.backend.next_response(&self.sql, &self.binds) {
            Scripted::Rows {
                columns,
                rows,
                fail_at,
            } => Ok(Box::new(ScriptedStream {
                backend: self.backend,
                columns,
                rows: rows.into(),
                fail_at,
                fetched: 0,
                closed: false,
            })),
            Scripted::Affected(_) => panic!("`{}` expected a result set", self.sql),
        }
    }

    fn close(self: Box<Self>) -> DbResult<()> {
        Ok(())
    }
}

struct ScriptedStream<'c> {
    backend: &'c ScriptedBackend,
    columns: Vec<ColumnMeta>,
    rows: VecDeque<Vec<Value>>,
    fail_at: Option<usize>,
    fetched: usize,
    closed: bool,
}

impl ResultStream for ScriptedStream<'_> {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next_row(&mut self) -> DbResult<Option<Vec<Value>>> {
        if self.closed {
            return Err(DbError::CursorClosed);
        }
        if self.fail_at == Some(self.fetched) {
            return Err(DbError::Driver("injected fetch failure".into()));
        }
        self.fetched += 1;
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) -> DbResult<()> {
        if !self.closed && self.backend.fail_next_close.replace(false) {
            return Err(DbError::Driver("injected close failure".into()));
        }
        if !self.closed {
            self.closed = true;
            self.backend
                .closed_streams
                .set(self.backend.closed_streams.get() + 1);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
