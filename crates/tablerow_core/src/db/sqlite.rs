//! `Backend` implementation for bundled SQLite via `rusqlite`.
//!
//! # Responsibility
//! - Introspect tables with `PRAGMA table_info`.
//! - Map declared column types to `SqlType` by affinity keywords.
//! - Translate between `Value` and SQLite storage classes.
//!
//! # Invariants
//! - Result rows are stepped one at a time; the stream owns the statement
//!   together with its live `rusqlite::Rows` until `close` finalizes it.
//! - Expression columns without a declared type are `SqlType::Untyped`;
//!   their values keep the storage class of each row.

use super::backend::{Backend, ColumnMeta, PreparedStatement, ResultStream};
use super::{DbError, DbResult};
use crate::model::{SqlType, Value};
use crate::schema::validate_identifier;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use ouroboros::self_referencing;
use rusqlite::{Connection, Rows, Statement};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

struct TableInfoRow {
    name: String,
    declared_type: String,
    key_position: i64,
}

fn table_info(conn: &Connection, schema: Option<&str>, table: &str) -> DbResult<Vec<TableInfoRow>> {
    validate_identifier(table)?;
    let sql = match schema {
        Some(schema) => {
            validate_identifier(schema)?;
            format!("PRAGMA {schema}.table_info({table})")
        }
        None => format!("PRAGMA table_info({table})"),
    };
    let mut stmt = Connection::prepare(conn, &sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(TableInfoRow {
            name: row.get(1)?,
            declared_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            key_position: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

impl Backend for Connection {
    fn product_name(&self) -> DbResult<String> {
        Ok(format!("SQLite {}", rusqlite::version()))
    }

    fn primary_key_columns(&self, schema: Option<&str>, table: &str) -> DbResult<Vec<String>> {
        let mut keyed: Vec<TableInfoRow> = table_info(self, schema, table)?
            .into_iter()
            .filter(|column| column.key_position > 0)
            .collect();
        keyed.sort_by_key(|column| column.key_position);
        Ok(keyed.into_iter().map(|column| column.name).collect())
    }

    fn table_columns(&self, schema: Option<&str>, table: &str) -> DbResult<Vec<ColumnMeta>> {
        Ok(table_info(self, schema, table)?
            .into_iter()
            .map(|column| ColumnMeta::new(column.name, declared_sql_type(&column.declared_type)))
            .collect())
    }

    fn prepare<'c>(&'c self, sql: &str) -> DbResult<Box<dyn PreparedStatement<'c> + 'c>> {
        let statement = Connection::prepare(self, sql)?;
        Ok(Box::new(SqliteStatement { statement }))
    }
}

/// Maps a declared column type to a backend type code.
pub(crate) fn declared_sql_type(declared: &str) -> SqlType {
    let upper = declared.trim().to_ascii_uppercase();
    let base = upper.split('(').next().unwrap_or_default().trim();
    match base {
        "" | "BLOB" => SqlType::Other("BLOB".to_string()),
        "BOOL" | "BOOLEAN" | "BIT" => SqlType::Boolean,
        "BIGINT" | "INT8" | "UNSIGNED BIG INT" => SqlType::BigInt,
        "DATETIME" | "TIMESTAMP" => SqlType::Timestamp,
        "DATE" => SqlType::Date,
        "TIME" => SqlType::Time,
        "NUMERIC" | "DECIMAL" | "NUMBER" => SqlType::Numeric,
        _ if base.contains("INT") => SqlType::Integer,
        _ if ["CHAR", "CLOB", "TEXT"].iter().any(|k| base.contains(k)) => SqlType::Text,
        _ if ["REAL", "FLOA", "DOUB"].iter().any(|k| base.contains(k)) => SqlType::Double,
        _ => SqlType::Other(base.to_string()),
    }
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(v) => SqliteValue::Integer(i64::from(*v)),
        Value::Short(v) => SqliteValue::Integer(i64::from(*v)),
        Value::Int(v) => SqliteValue::Integer(i64::from(*v)),
        Value::Long(v) => SqliteValue::Integer(*v),
        Value::Float(v) => SqliteValue::Real(f64::from(*v)),
        Value::Double(v) => SqliteValue::Real(*v),
        Value::Decimal(v) => SqliteValue::Text(v.to_string()),
        Value::Text(v) => SqliteValue::Text(v.clone()),
        Value::Bytes(v) => SqliteValue::Blob(v.clone()),
        Value::Date(v) => SqliteValue::Text(v.format(DATE_FORMAT).to_string()),
        Value::Time(v) => SqliteValue::Text(v.format(TIME_FORMAT).to_string()),
        Value::Timestamp(v) => SqliteValue::Text(v.format(TIMESTAMP_FORMAT).to_string()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Long(v),
        ValueRef::Real(v) => Value::Double(v),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::Text(text.to_string()),
            Err(_) => Value::Bytes(bytes.to_vec()),
        },
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

struct SqliteStatement<'c> {
    statement: Statement<'c>,
}

impl<'c> PreparedStatement<'c> for SqliteStatement<'c> {
    fn bind(&mut self, index: usize, value: &Value) -> DbResult<()> {
        self.statement.raw_bind_parameter(index, to_sqlite(value))?;
        Ok(())
    }

    fn execute_update(&mut self) -> DbResult<usize> {
        Ok(self.statement.raw_execute()?)
    }

    fn execute_query(self: Box<Self>) -> DbResult<Box<dyn ResultStream + 'c>> {
        let statement = self.statement;
        let columns: Vec<ColumnMeta> = statement
            .columns()
            .iter()
            .map(|column| {
                let sql_type = column
                    .decl_type()
                    .map_or(SqlType::Untyped, declared_sql_type);
                ColumnMeta::new(column.name(), sql_type)
            })
            .collect();
        let live = LiveRows::new(statement, |statement| statement.raw_query());
        Ok(Box::new(SqliteRows {
            live: Some(live),
            columns,
        }))
    }

    fn close(self: Box<Self>) -> DbResult<()> {
        self.statement.finalize()?;
        Ok(())
    }
}

/// A statement and the row cursor stepping it.
#[self_referencing]
struct LiveRows<'c> {
    statement: Statement<'c>,
    #[borrows(mut statement)]
    #[covariant]
    rows: Rows<'this>,
}

struct SqliteRows<'c> {
    live: Option<LiveRows<'c>>,
    columns: Vec<ColumnMeta>,
}

impl ResultStream for SqliteRows<'_> {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next_row(&mut self) -> DbResult<Option<Vec<Value>>> {
        let width = self.columns.len();
        let live = self.live.as_mut().ok_or(DbError::CursorClosed)?;
        live.with_rows_mut(|rows| -> DbResult<Option<Vec<Value>>> {
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            let mut values = Vec::with_capacity(width);
            for position in 0..width {
                values.push(from_sqlite(row.get_ref(position)?));
            }
            Ok(Some(values))
        })
    }

    fn close(&mut self) -> DbResult<()> {
        match self.live.take() {
            Some(live) => Ok(live.into_heads().statement.finalize()?),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.live.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::declared_sql_type;
    use crate::db::backend::Backend;
    use crate::db::DbError;
    use crate::model::{SqlType, Value};
    use rusqlite::Connection;

    fn conn_with_widgets() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT, price NUMERIC(10, 2));",
        )
        .unwrap();
        conn
    }

    #[test]
    fn declared_types_map_by_affinity() {
        assert_eq!(declared_sql_type("INTEGER"), SqlType::Integer);
        assert_eq!(declared_sql_type("bigint"), SqlType::BigInt);
        assert_eq!(declared_sql_type("VARCHAR(64)"), SqlType::Text);
        assert_eq!(declared_sql_type("NUMERIC(10, 2)"), SqlType::Numeric);
        assert_eq!(declared_sql_type("DOUBLE PRECISION"), SqlType::Double);
        assert_eq!(declared_sql_type("BOOLEAN"), SqlType::Boolean);
        assert_eq!(declared_sql_type("TIMESTAMP"), SqlType::Timestamp);
        assert_eq!(declared_sql_type("DATE"), SqlType::Date);
        assert_eq!(declared_sql_type("TIME"), SqlType::Time);
        assert_eq!(declared_sql_type("BLOB"), SqlType::Other("BLOB".into()));
        assert_eq!(declared_sql_type("GEOMETRY"), SqlType::Other("GEOMETRY".into()));
    }

    #[test]
    fn introspection_lists_columns_and_key() {
        let conn = conn_with_widgets();
        let columns = Backend::table_columns(&conn, None, "widgets").unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "price"]);
        assert_eq!(
            Backend::primary_key_columns(&conn, None, "widgets").unwrap(),
            vec!["id".to_string()]
        );
        assert!(Backend::table_columns(&conn, None, "missing").unwrap().is_empty());
    }

    #[test]
    fn expression_columns_are_untyped() {
        let conn = conn_with_widgets();
        conn.execute_batch("INSERT INTO widgets (id, name) VALUES (1, 'a'), (2, NULL);")
            .unwrap();
        let stmt = Backend::prepare(&conn, "SELECT COUNT(*) AS n, MAX(name) AS top FROM widgets")
            .unwrap();
        let mut stream = stmt.execute_query().unwrap();
        assert_eq!(stream.columns()[0].sql_type, SqlType::Untyped);
        assert_eq!(stream.columns()[1].sql_type, SqlType::Untyped);
        assert_eq!(
            stream.next_row().unwrap(),
            Some(vec![Value::Long(2), Value::Text("a".into())])
        );
        assert_eq!(stream.next_row().unwrap(), None);
        stream.close().unwrap();
        stream.close().unwrap();
        assert!(stream.is_closed());
        assert!(matches!(stream.next_row(), Err(DbError::CursorClosed)));
    }

    #[test]
    fn rows_are_fetched_one_step_at_a_time() {
        let conn = conn_with_widgets();
        conn.execute_batch("INSERT INTO widgets (id) VALUES (1), (2), (3);")
            .unwrap();
        let stmt = Backend::prepare(
            &conn,
            "SELECT CASE WHEN id = 3 THEN abs(-9223372036854775807 - 1) ELSE id END AS v \
             FROM widgets ORDER BY id",
        )
        .unwrap();
        let mut stream = stmt.execute_query().unwrap();
        assert_eq!(stream.next_row().unwrap(), Some(vec![Value::Long(1)]));
        assert_eq!(stream.next_row().unwrap(), Some(vec![Value::Long(2)]));
        assert!(matches!(stream.next_row(), Err(DbError::Sqlite(_))));
        stream.close().unwrap();
    }

    #[test]
    fn bound_values_round_trip_through_storage() {
        let conn = conn_with_widgets();
        let mut insert = Backend::prepare(&conn, "INSERT INTO widgets (id, name) VALUES (?, ?)")
            .unwrap();
        insert.bind(1, &Value::Int(4)).unwrap();
        insert.bind(2, &Value::Text("four".into())).unwrap();
        assert_eq!(insert.execute_update().unwrap(), 1);
        insert.close().unwrap();

        let name: String = conn
            .query_row("SELECT name FROM widgets WHERE id = 4", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "four");
    }
}
