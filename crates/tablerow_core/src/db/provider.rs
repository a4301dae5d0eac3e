//! Pooled connections and one-time dialect detection.
//!
//! # Responsibility
//! - Size an `r2d2` pool from `DbConfig`.
//! - Detect the backend dialect once per provider from a pooled connection.
//!
//! # Invariants
//! - Checkout failures (exhaustion, timeout) are returned unmodified.
//! - After detection the dialect is read without further synchronization.

use super::backend::{Backend, ColumnMeta, PreparedStatement};
use super::DbResult;
use crate::config::DbConfig;
use crate::dialect::{self, Dialect};
use log::{error, info};
use once_cell::sync::OnceCell;
use r2d2::{ManageConnection, Pool, PooledConnection};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub max_size: u32,
    pub connections: u32,
    pub idle_connections: u32,
}

pub struct ConnectionProvider<M: ManageConnection> {
    name: String,
    pool: Pool<M>,
    dialect: OnceCell<Arc<dyn Dialect>>,
}

impl<M> ConnectionProvider<M>
where
    M: ManageConnection,
    M::Connection: Backend,
{
    /// Builds the pool, opening its initial connections.
    pub fn new(manager: M, config: &DbConfig) -> DbResult<Self> {
        config.validate()?;
        let started_at = Instant::now();
        let mut builder = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_millis(config.max_wait_ms))
            .max_lifetime(None)
            .test_on_check_out(true);
        builder = match config.max_idle {
            // Connections idle beyond the kept count are reaped by the pool.
            Some(max_idle) => builder.min_idle(Some(max_idle.min(config.max_connections))),
            None => builder.idle_timeout(None),
        };
        let pool = builder.build(manager).map_err(|err| {
            error!(
                "event=pool_open module=db status=error pool={} duration_ms={} error_code=pool_build_failed error={}",
                config.pool_name,
                started_at.elapsed().as_millis(),
                err
            );
            err
        })?;
        info!(
            "event=pool_open module=db status=ok pool={} max_connections={} max_wait_ms={} duration_ms={}",
            config.pool_name,
            config.max_connections,
            config.max_wait_ms,
            started_at.elapsed().as_millis()
        );
        Ok(Self {
            name: config.pool_name.clone(),
            pool,
            dialect: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks out a connection, waiting at most the configured time.
    pub fn get(&self) -> DbResult<PooledConnection<M>> {
        self.pool.get().map_err(|err| {
            error!(
                "event=pool_checkout module=db status=error pool={} error_code=checkout_failed error={}",
                self.name, err
            );
            err.into()
        })
    }

    /// Dialect of the pooled backend, detected on first call.
    pub fn dialect(&self) -> DbResult<Arc<dyn Dialect>> {
        self.dialect
            .get_or_try_init(|| {
                let conn = self.get()?;
                dialect::detect(&conn.product_name()?)
            })
            .cloned()
    }

    pub fn state(&self) -> PoolState {
        let state = self.pool.state();
        PoolState {
            max_size: self.pool.max_size(),
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }
}

impl<M> Backend for PooledConnection<M>
where
    M: ManageConnection,
    M::Connection: Backend,
{
    fn product_name(&self) -> DbResult<String> {
        (**self).product_name()
    }

    fn primary_key_columns(&self, schema: Option<&str>, table: &str) -> DbResult<Vec<String>> {
        (**self).primary_key_columns(schema, table)
    }

    fn table_columns(&self, schema: Option<&str>, table: &str) -> DbResult<Vec<ColumnMeta>> {
        (**self).table_columns(schema, table)
    }

    fn prepare<'c>(&'c self, sql: &str) -> DbResult<Box<dyn PreparedStatement<'c> + 'c>> {
        Backend::prepare(&**self, sql)
    }
}
