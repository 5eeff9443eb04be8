// Database module - the single-connection wrapper everything else builds on.
//
// Split into:
// - core: open/close, connection state, busy timeout, interrupt
// - exec: updates, batches, row ids and change counts
// - query: prepared statements, cursors and scalar helpers
// - tx: transactions and savepoints
// - schema: schema introspection and header pragmas
// - functions: user-defined SQL functions and date formatting

mod core;
mod exec;
mod functions;
mod query;
mod schema;
mod tx;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::DatabaseOptions;
use crate::error::SqliteDbError;

pub use exec::RowDictionary;
pub use tx::{TransactionKind, TxOutcome};

/// Error details recorded for the most recent failed operation on a [`Database`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    /// Primary `SQLite` result code (`SQLITE_ERROR` for errors raised by this crate).
    pub code: i32,
    /// Extended `SQLite` result code.
    pub extended_code: i32,
    pub message: String,
}

const SQLITE_ERROR: i32 = 1;

impl LastError {
    /// Whether this records a busy or locked database.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        const SQLITE_BUSY: i32 = 5;
        const SQLITE_LOCKED: i32 = 6;
        self.code == SQLITE_BUSY || self.code == SQLITE_LOCKED
    }

    fn from_error(err: &SqliteDbError) -> Self {
        match err {
            SqliteDbError::SqliteError(rusqlite::Error::SqliteFailure(failure, message)) => Self {
                code: failure.extended_code & 0xff,
                extended_code: failure.extended_code,
                message: message.clone().unwrap_or_else(|| failure.to_string()),
            },
            other => Self {
                code: SQLITE_ERROR,
                extended_code: SQLITE_ERROR,
                message: other.to_string(),
            },
        }
    }
}

/// Bookkeeping for one cached SQL text.
#[derive(Debug, Clone, Default)]
pub(crate) struct StatementStats {
    pub(crate) use_count: u64,
    pub(crate) handles: usize,
}

/// State shared between a `Database` and the statements and cursors borrowed from it.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) statements: RefCell<HashMap<String, StatementStats>>,
    pub(crate) open_result_sets: Cell<usize>,
    pub(crate) result_set_generation: Cell<u64>,
    last_error: RefCell<Option<LastError>>,
    pub(crate) date_format: Option<String>,
    pub(crate) logs_errors: bool,
    pub(crate) trace_execution: bool,
}

impl Shared {
    fn from_options(options: &DatabaseOptions) -> Self {
        Self {
            date_format: options.date_format.clone(),
            logs_errors: options.logs_errors,
            trace_execution: options.trace_execution,
            ..Self::default()
        }
    }

    /// Remember the outcome of an operation so `last_error` reflects the latest call.
    pub(crate) fn record<T>(&self, result: Result<T, SqliteDbError>) -> Result<T, SqliteDbError> {
        match &result {
            Ok(_) => {
                self.last_error.replace(None);
            }
            Err(err) => {
                if self.logs_errors {
                    tracing::warn!(error = %err, "sqlite operation failed");
                }
                self.last_error.replace(Some(LastError::from_error(err)));
            }
        }
        result
    }

    pub(crate) fn trace_sql(&self, sql: &str) {
        if self.trace_execution {
            tracing::trace!(sql, "executing");
        }
    }

    pub(crate) fn date_format(&self) -> Option<&str> {
        self.date_format.as_deref()
    }

    pub(crate) fn result_set_opened(&self) -> u64 {
        self.open_result_sets.set(self.open_result_sets.get() + 1);
        self.result_set_generation.get()
    }

    pub(crate) fn result_set_closed(&self, generation: u64) {
        if generation == self.result_set_generation.get() {
            self.open_result_sets
                .set(self.open_result_sets.get().saturating_sub(1));
        }
    }

    pub(crate) fn is_result_set_live(&self, generation: u64) -> bool {
        generation == self.result_set_generation.get()
    }

    fn close_result_sets(&self) {
        self.result_set_generation
            .set(self.result_set_generation.get().wrapping_add(1));
        self.open_result_sets.set(0);
    }
}

/// One `SQLite` connection plus the bookkeeping this crate layers on top of it.
///
/// A `Database` is `Send` but not `Sync`: hand it to a single thread at a time, or share it
/// through a [`DatabaseQueue`](crate::DatabaseQueue) or [`DatabasePool`](crate::DatabasePool).
#[derive(Debug)]
pub struct Database {
    conn: Option<rusqlite::Connection>,
    options: DatabaseOptions,
    shared: Shared,
    busy_timeout: Duration,
    cache_statements: bool,
}
