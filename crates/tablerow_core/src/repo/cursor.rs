//! Lazy, forward-only result cursor.
//!
//! # Responsibility
//! - Materialize one `Row` at a time from an open result stream.
//! - Own the stream and its statement until closed.
//!
//! # Invariants
//! - `has_next` peeks at most one row and is idempotent until `next_row`.
//! - Reaching end of data closes the cursor.
//! - `close` is idempotent and reachable from every state.
//! - `to_list` always releases the stream, including on failure.
//! - A stream release that fails leaves the cursor open; `close` and `Drop`
//!   retry it.
//! - Dropping an open cursor closes it and logs a leak; callers are expected
//!   to close or drain cursors explicitly.

use super::convert::{materialize, ColumnPlan};
use crate::db::backend::{with_cleanup, ResultStream};
use crate::db::{DbError, DbResult};
use crate::dialect::Dialect;
use crate::model::{Row, RowLayout};
use crate::schema::TableSchema;
use log::warn;
use std::sync::Arc;

enum CursorState {
    Open,
    Peeked(Row),
    /// End of data was reached; the stream is closed.
    Exhausted,
    Closed,
}

pub struct ResultCursor<'c> {
    stream: Box<dyn ResultStream + 'c>,
    dialect: Arc<dyn Dialect>,
    table: Option<String>,
    layout: Arc<RowLayout>,
    plan: Vec<ColumnPlan>,
    state: CursorState,
}

impl<'c> ResultCursor<'c> {
    /// Cursor whose rows are bound to `schema`; column types come from the
    /// cached schema. Result columns the schema does not know are skipped.
    pub(crate) fn tagged(
        stream: Box<dyn ResultStream + 'c>,
        dialect: Arc<dyn Dialect>,
        schema: &TableSchema,
    ) -> Self {
        let mut plan: Vec<ColumnPlan> = Vec::with_capacity(schema.columns().len());
        for (source, meta) in stream.columns().iter().enumerate() {
            let Some(position) = schema.position(&meta.name) else {
                continue;
            };
            if plan.iter().any(|column| column.position == position) {
                continue;
            }
            let descriptor = &schema.columns()[position];
            plan.push(ColumnPlan {
                position,
                source,
                name: descriptor.canonical_name.clone(),
                sql_type: descriptor.sql_type.clone(),
            });
        }
        Self::new(
            stream,
            dialect,
            Some(schema.name().to_string()),
            Arc::clone(schema.layout()),
            plan,
        )
    }

    /// Cursor for ad hoc queries; column names and types come from the live
    /// result metadata.
    pub(crate) fn untagged(stream: Box<dyn ResultStream + 'c>, dialect: Arc<dyn Dialect>) -> Self {
        let columns = stream.columns();
        let layout = Arc::new(RowLayout::new(
            columns.iter().map(|meta| dialect.canonicalize(&meta.name)),
        ));
        let plan = columns
            .iter()
            .enumerate()
            .map(|(source, meta)| ColumnPlan {
                position: source,
                source,
                name: meta.name.clone(),
                sql_type: meta.sql_type.clone(),
            })
            .collect();
        Self::new(stream, dialect, None, layout, plan)
    }

    fn new(
        stream: Box<dyn ResultStream + 'c>,
        dialect: Arc<dyn Dialect>,
        table: Option<String>,
        layout: Arc<RowLayout>,
        plan: Vec<ColumnPlan>,
    ) -> Self {
        Self {
            stream,
            dialect,
            table,
            layout,
            plan,
            state: CursorState::Open,
        }
    }

    /// Table the rows are bound to, or `None` for ad hoc queries.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn column_names(&self) -> &[String] {
        self.layout.names()
    }

    /// Whether another row is available, peeking one row ahead if needed.
    pub fn has_next(&mut self) -> DbResult<bool> {
        match self.state {
            CursorState::Peeked(_) => return Ok(true),
            CursorState::Exhausted | CursorState::Closed => return Ok(false),
            CursorState::Open => {}
        }
        match self.stream.next_row()? {
            Some(raw) => {
                let row = materialize(
                    self.dialect.as_ref(),
                    self.table.as_deref(),
                    &self.layout,
                    &self.plan,
                    raw,
                )?;
                self.state = CursorState::Peeked(row);
                Ok(true)
            }
            None => {
                // Stays open until the stream is released so `Drop` can retry.
                self.stream.close()?;
                self.state = CursorState::Exhausted;
                Ok(false)
            }
        }
    }

    /// Consumes the next row.
    ///
    /// # Errors
    /// - `CursorExhausted` past the last row; `CursorClosed` after `close`.
    pub fn next_row(&mut self) -> DbResult<Row> {
        if !self.has_next()? {
            return Err(match self.state {
                CursorState::Closed => DbError::CursorClosed,
                _ => DbError::CursorExhausted,
            });
        }
        match std::mem::replace(&mut self.state, CursorState::Open) {
            CursorState::Peeked(row) => Ok(row),
            other => {
                self.state = other;
                Err(DbError::CursorExhausted)
            }
        }
    }

    /// Releases the result stream and its statement. Idempotent.
    pub fn close(&mut self) -> DbResult<()> {
        match self.state {
            CursorState::Exhausted | CursorState::Closed => Ok(()),
            CursorState::Open | CursorState::Peeked(_) => {
                self.stream.close()?;
                self.state = CursorState::Closed;
                Ok(())
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, CursorState::Exhausted | CursorState::Closed)
    }

    /// Drains the remaining rows and closes the cursor, even when draining
    /// fails partway.
    pub fn to_list(&mut self) -> DbResult<Vec<Row>> {
        let mut rows = Vec::new();
        let drained = loop {
            match self.has_next() {
                Ok(true) => match self.next_row() {
                    Ok(row) => rows.push(row),
                    Err(err) => break Err(err),
                },
                Ok(false) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        with_cleanup(drained.map(|()| rows), self.close(), "cursor")
    }

    /// First remaining row, if any; the cursor is closed afterwards.
    pub fn first(&mut self) -> DbResult<Option<Row>> {
        let first = match self.has_next() {
            Ok(true) => self.next_row().map(Some),
            Ok(false) => Ok(None),
            Err(err) => Err(err),
        };
        with_cleanup(first, self.close(), "cursor")
    }
}

impl Iterator for ResultCursor<'_> {
    type Item = DbResult<Row>;

    /// Yields rows until end of data; after an error the cursor is closed and
    /// iteration ends.
    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => Some(self.next_row()),
            Ok(false) => None,
            Err(err) => {
                if let Err(close_err) = self.close() {
                    warn!(
                        "event=cursor_close module=repo status=warn error_code=close_failed_after_error error={} primary_error={}",
                        close_err, err
                    );
                }
                Some(Err(err))
            }
        }
    }
}

impl Drop for ResultCursor<'_> {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        warn!(
            "event=cursor_leak module=repo status=warn table={} error_code=cursor_not_closed",
            self.table.as_deref().unwrap_or("query")
        );
        if let Err(err) = self.close() {
            warn!(
                "event=cursor_leak module=repo status=warn error_code=close_failed error={}",
                err
            );
        }
    }
}
