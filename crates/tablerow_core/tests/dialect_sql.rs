mod common;

use common::{executor_for, Executed, Scripted, ScriptedBackend};
use rust_decimal::Decimal;
use tablerow_core::db::ColumnMeta;
use tablerow_core::dialect::detect;
use tablerow_core::{DbError, SqlType, Value};

fn columns(names: &[(&str, SqlType)]) -> Vec<ColumnMeta> {
    names
        .iter()
        .map(|(name, sql_type)| ColumnMeta::new(*name, sql_type.clone()))
        .collect()
}

#[test]
fn postgres_create_returns_key_in_one_round_trip() {
    let backend = ScriptedBackend::new("PostgreSQL 16.2").with_table(
        "widgets",
        &["id"],
        columns(&[("id", SqlType::Integer), ("name", SqlType::Text)]),
    );
    let executor = executor_for("PostgreSQL");
    backend.respond(Scripted::rows(
        columns(&[("id", SqlType::Integer)]),
        vec![vec![Value::Long(7)]],
    ));

    let row = executor.create(&backend, "widgets").unwrap();
    assert_eq!(row.get("id").unwrap(), &Value::Int(7));
    assert_eq!(
        backend.executed(),
        vec![Executed {
            sql: "INSERT INTO widgets (id, name) VALUES (nextval('widgets_seq'), ?) RETURNING id"
                .to_string(),
            binds: vec![Value::Null],
        }]
    );
    assert_eq!(backend.closed_streams(), 1);
}

#[test]
fn postgres_binds_native_booleans() {
    let backend = ScriptedBackend::new("PostgreSQL 16.2").with_table(
        "gadgets",
        &["id"],
        columns(&[("id", SqlType::Integer), ("flag", SqlType::Boolean)]),
    );
    let executor = executor_for("PostgreSQL");
    backend.respond(Scripted::rows(
        columns(&[("id", SqlType::Integer)]),
        vec![vec![Value::Int(3)]],
    ));
    let mut row = executor.create(&backend, "gadgets").unwrap();
    row.reset_changed();

    row.set_column("flag", true).unwrap();
    backend.respond(Scripted::Affected(1));
    assert_eq!(executor.update(&backend, &mut row).unwrap(), 1);

    let update = backend.executed().pop().unwrap();
    assert_eq!(update.sql, "UPDATE gadgets SET flag = ? WHERE id = ?");
    assert_eq!(update.binds, vec![Value::Bool(true), Value::Int(3)]);
}

#[test]
fn postgres_pages_with_offset_before_limit() {
    let backend = ScriptedBackend::new("PostgreSQL 16.2").with_table(
        "widgets",
        &["id"],
        columns(&[("id", SqlType::Integer), ("name", SqlType::Text)]),
    );
    let executor = executor_for("PostgreSQL");
    backend.respond(Scripted::rows(
        columns(&[("id", SqlType::Integer), ("name", SqlType::Text)]),
        Vec::new(),
    ));

    let rows = executor
        .query_table_page(&backend, "widgets", "SELECT * FROM widgets", &[], 20, Some(10))
        .unwrap()
        .to_list()
        .unwrap();
    assert!(rows.is_empty());
    let executed = backend.executed().pop().unwrap();
    assert_eq!(executed.sql, "SELECT * FROM widgets OFFSET ? LIMIT ?");
    assert_eq!(executed.binds, vec![Value::Long(20), Value::Long(10)]);
}

#[test]
fn oracle_fetches_key_then_inserts_with_uppercase_identifiers() {
    let backend = ScriptedBackend::new("Oracle Database 19c").with_table(
        "WIDGETS",
        &["ID"],
        columns(&[("ID", SqlType::Integer), ("NAME", SqlType::Text)]),
    );
    let executor = executor_for("Oracle");
    backend.respond(Scripted::rows(
        columns(&[("NEXTVAL", SqlType::Numeric)]),
        vec![vec![Value::Decimal(Decimal::from(41))]],
    ));
    backend.respond(Scripted::Affected(1));

    let row = executor.create(&backend, "widgets").unwrap();
    assert_eq!(row.table(), Some("WIDGETS"));
    assert_eq!(row.get("id").unwrap(), &Value::Long(41));
    assert_eq!(
        backend.executed(),
        vec![
            Executed {
                sql: "SELECT WIDGETS_SEQ.NEXTVAL FROM DUAL".to_string(),
                binds: Vec::new(),
            },
            Executed {
                sql: "INSERT INTO WIDGETS (ID, NAME) VALUES (?, ?)".to_string(),
                binds: vec![Value::Long(41), Value::Null],
            },
        ]
    );
}

#[test]
fn oracle_pages_through_rownum_and_drops_the_counter() {
    let backend = ScriptedBackend::new("Oracle Database 19c").with_table(
        "WIDGETS",
        &["ID"],
        columns(&[("ID", SqlType::Integer), ("NAME", SqlType::Text)]),
    );
    let executor = executor_for("Oracle");
    backend.respond(Scripted::rows(
        columns(&[
            ("ID", SqlType::Integer),
            ("NAME", SqlType::Text),
            ("RNUM", SqlType::Numeric),
        ]),
        vec![vec![
            Value::Decimal(Decimal::from(21)),
            Value::from("u"),
            Value::Decimal(Decimal::from(21)),
        ]],
    ));

    let rows = executor
        .query_table_page(
            &backend,
            "widgets",
            "SELECT * FROM WIDGETS ORDER BY ID",
            &[],
            20,
            Some(10),
        )
        .unwrap()
        .to_list()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].column_names(), ["ID", "NAME"]);
    assert_eq!(rows[0].get_long("id").unwrap(), Some(21));

    let executed = backend.executed().pop().unwrap();
    assert_eq!(
        executed.sql,
        "SELECT * FROM (SELECT rec.*, ROWNUM rnum FROM (SELECT * FROM WIDGETS ORDER BY ID) rec \
         WHERE ROWNUM <= ?) WHERE rnum > ?"
    );
    assert_eq!(executed.binds, vec![Value::Long(30), Value::Long(20)]);
}

#[test]
fn oracle_stores_booleans_as_integers() {
    let backend = ScriptedBackend::new("Oracle Database 19c").with_table(
        "GADGETS",
        &["ID"],
        columns(&[("ID", SqlType::Integer), ("FLAG", SqlType::Boolean)]),
    );
    let executor = executor_for("Oracle");
    backend.respond(Scripted::rows(
        columns(&[("ID", SqlType::Integer), ("FLAG", SqlType::Boolean)]),
        vec![vec![Value::Decimal(Decimal::from(5)), Value::Decimal(Decimal::ONE)]],
    ));

    let mut row = executor.find(&backend, "gadgets", 5).unwrap().unwrap();
    assert_eq!(row.get_boolean("flag").unwrap(), Some(true));

    row.set_column("flag", false).unwrap();
    backend.respond(Scripted::Affected(1));
    executor.update(&backend, &mut row).unwrap();
    let update = backend.executed().pop().unwrap();
    assert_eq!(update.sql, "UPDATE GADGETS SET FLAG = ? WHERE ID = ?");
    assert_eq!(update.binds, vec![Value::Int(0), Value::Long(5)]);
}

#[test]
fn unrecognized_products_are_rejected() {
    assert!(matches!(
        detect("H2 2.2.224").unwrap_err(),
        DbError::UnsupportedBackend(ref product) if product == "H2 2.2.224"
    ));
    assert_eq!(detect("PostgreSQL 16").unwrap().name(), "postgres");
    assert_eq!(detect("Oracle").unwrap().name(), "oracle");
}
