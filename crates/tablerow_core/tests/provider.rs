use tablerow_core::config::{DEFAULT_MAX_WAIT_MS, DEFAULT_POOL_NAME};
use tablerow_core::{open_database, DbConfig, DbError, Value};
use tempfile::TempDir;

fn file_config(dir: &TempDir) -> DbConfig {
    DbConfig::sqlite(dir.path().join("provider.db").to_string_lossy())
}

#[test]
fn file_database_reports_sqlite_and_passes_check() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = file_config(&dir);
    config.max_connections = 4;
    let database = open_database(&config).unwrap();

    database.check().unwrap();
    let info = database.info().unwrap();
    assert_eq!(info.dialect, "sqlite");
    assert!(info.product.starts_with("SQLite"));
    assert_eq!(info.pool_name, DEFAULT_POOL_NAME);
    assert_eq!(info.pool.max_size, 4);
    assert!(info.cached_tables.is_empty());
}

#[test]
fn pooled_connections_enforce_foreign_keys() {
    let dir = tempfile::tempdir().unwrap();
    let database = open_database(&file_config(&dir)).unwrap();

    let conn = database.connection().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);

    conn.execute_batch(
        "CREATE TABLE owners (id INTEGER PRIMARY KEY);
         CREATE TABLE pets (id INTEGER PRIMARY KEY, owner INTEGER REFERENCES owners(id));",
    )
    .unwrap();
    let orphan = database
        .executor()
        .update_query(
            &conn,
            "INSERT INTO pets (id, owner) VALUES (?, ?)",
            &[Value::Int(1), Value::Int(99)],
        )
        .unwrap_err();
    assert!(matches!(orphan, DbError::Sqlite(_)));
}

#[test]
fn rows_written_on_one_connection_are_visible_on_another() {
    let dir = tempfile::tempdir().unwrap();
    let database = open_database(&file_config(&dir)).unwrap();

    let writer = database.connection().unwrap();
    writer
        .execute_batch("CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT);")
        .unwrap();
    let mut row = database.executor().create(&writer, "widgets").unwrap();
    row.set_column("name", "shared").unwrap();
    database.executor().update(&writer, &mut row).unwrap();

    let reader = database.connection().unwrap();
    let found = database
        .executor()
        .find(&reader, "widgets", 1)
        .unwrap()
        .unwrap();
    assert_eq!(found.get_string("name").unwrap(), Some("shared"));
    assert_eq!(database.info().unwrap().cached_tables, vec!["widgets"]);
}

#[test]
fn memory_database_uses_a_single_connection() {
    let database = open_database(&DbConfig::default()).unwrap();
    assert_eq!(database.provider().state().max_size, 1);

    {
        let conn = database.connection().unwrap();
        conn.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);")
            .unwrap();
        database.executor().create(&conn, "notes").unwrap();
    }

    database.check().unwrap();
    let conn = database.connection().unwrap();
    assert!(database.executor().find(&conn, "notes", 1).unwrap().is_some());
}

#[test]
fn exhausted_pool_times_out_with_pool_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = file_config(&dir);
    config.max_connections = 1;
    config.max_wait_ms = 50;
    let database = open_database(&config).unwrap();

    let held = database.connection().unwrap();
    let err = database.connection().unwrap_err();
    assert!(matches!(err, DbError::Pool(_)));
    drop(held);
    assert!(database.connection().is_ok());
}

#[test]
fn invalid_config_is_rejected_before_opening() {
    let mut config = DbConfig::default();
    config.max_connections = 0;
    assert!(matches!(
        open_database(&config).err().unwrap(),
        DbError::Config(_)
    ));
}

#[test]
fn json_config_fills_missing_fields_with_defaults() {
    let config: DbConfig =
        serde_json::from_str(r#"{ "url": "app.db", "max_connections": 4 }"#).unwrap();
    assert_eq!(config.url, "app.db");
    assert_eq!(config.max_connections, 4);
    assert_eq!(config.max_wait_ms, DEFAULT_MAX_WAIT_MS);
    assert_eq!(config.pool_name, DEFAULT_POOL_NAME);
    assert_eq!(config.max_idle, None);

    let encoded = serde_json::to_string(&config).unwrap();
    let decoded: DbConfig = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, config);
}
