//! Process-root bootstrap: pool, dialect, catalog and executor.
//!
//! # Responsibility
//! - Open a pooled SQLite database from `DbConfig`.
//! - Detect the dialect and wire the single catalog and executor instances.
//! - Report backend and pool diagnostics.
//!
//! # Invariants
//! - Every pooled SQLite connection has `foreign_keys=ON` and a busy timeout.
//! - An unsupported backend fails here, before any query runs.
//! - In-memory databases use a single pooled connection so every checkout
//!   sees the same data.

use super::provider::{ConnectionProvider, PoolState};
use super::{Backend, DbError, DbResult};
use crate::config::DbConfig;
use crate::dialect::Dialect;
use crate::repo::QueryExecutor;
use crate::schema::SchemaCatalog;
use log::{error, info};
use r2d2::{ManageConnection, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Owned by the process root; hands out connections and shares one catalog
/// and executor with every caller.
pub struct Database<M: ManageConnection = SqliteConnectionManager> {
    provider: ConnectionProvider<M>,
    executor: QueryExecutor,
}

/// Backend and pool diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub pool_name: String,
    pub product: String,
    pub dialect: &'static str,
    pub pool: PoolState,
    pub cached_tables: Vec<String>,
}

impl Display for DatabaseInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "product: {}", self.product)?;
        writeln!(f, "dialect: {}", self.dialect)?;
        writeln!(
            f,
            "pool: {} ({}/{} connections, {} idle)",
            self.pool_name,
            self.pool.connections,
            self.pool.max_size,
            self.pool.idle_connections
        )?;
        write!(f, "cached tables: {}", self.cached_tables.len())
    }
}

/// Opens the SQLite database named by `config`.
///
/// # Side effects
/// - Opens the pool's initial connections.
/// - Emits `db_open` logging events with duration and status.
pub fn open_database(config: &DbConfig) -> DbResult<Database> {
    let started_at = Instant::now();
    let mode = if config.is_memory() { "memory" } else { "file" };
    info!("event=db_open module=db status=start mode={}", mode);

    match open_sqlite(config) {
        Ok(database) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(database)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn open_sqlite(config: &DbConfig) -> DbResult<Database> {
    config.validate()?;
    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
    let (manager, config) = if config.is_memory() {
        let single = DbConfig {
            max_connections: 1,
            max_idle: None,
            ..config.clone()
        };
        (SqliteConnectionManager::memory(), single)
    } else {
        (
            SqliteConnectionManager::file(config.sqlite_path()),
            config.clone(),
        )
    };
    let manager = manager.with_init(move |conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(busy_timeout)
    });
    let provider = ConnectionProvider::new(manager, &config)?;
    Database::new(provider, config.schema.clone())
}

impl<M> Database<M>
where
    M: ManageConnection,
    M::Connection: Backend,
{
    /// Detects the dialect through `provider` and builds a fresh catalog.
    pub fn new(provider: ConnectionProvider<M>, default_schema: Option<String>) -> DbResult<Self> {
        let dialect = provider.dialect()?;
        let catalog = Arc::new(SchemaCatalog::new(dialect, default_schema));
        Ok(Self {
            provider,
            executor: QueryExecutor::new(catalog),
        })
    }

    pub fn connection(&self) -> DbResult<PooledConnection<M>> {
        self.provider.get()
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        self.executor.catalog()
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        self.executor.dialect()
    }

    pub fn provider(&self) -> &ConnectionProvider<M> {
        &self.provider
    }

    pub fn info(&self) -> DbResult<DatabaseInfo> {
        let product = self.connection()?.product_name()?;
        Ok(DatabaseInfo {
            pool_name: self.provider.name().to_string(),
            product,
            dialect: self.dialect().name(),
            pool: self.provider.state(),
            cached_tables: self.catalog().cached_tables(),
        })
    }

    /// Runs the dialect's validation query on a pooled connection.
    pub fn check(&self) -> DbResult<()> {
        let started_at = Instant::now();
        let conn = self.connection()?;
        let sql = self.dialect().validation_query();
        match self.executor.query_single(&conn, sql, &[]) {
            Ok(Some(_)) => {
                info!(
                    "event=db_check module=db status=ok pool={} duration_ms={}",
                    self.provider.name(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Ok(None) => Err(DbError::Driver(
                format!("validation query `{sql}` returned no rows").into(),
            )),
            Err(err) => {
                error!(
                    "event=db_check module=db status=error pool={} error_code=validation_failed error={}",
                    self.provider.name(),
                    err
                );
                Err(err)
            }
        }
    }
}
