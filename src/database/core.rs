use std::path::PathBuf;
use std::time::Duration;

use rusqlite::{Connection, InterruptHandle};

use crate::config::{DatabaseOptions, DatabasePath};
use crate::error::SqliteDbError;

use super::{Database, Shared};

impl Database {
    /// Create an unopened database for `options`; call [`open`](Database::open) before use.
    #[must_use]
    pub fn new(options: DatabaseOptions) -> Self {
        Self {
            conn: None,
            shared: Shared::from_options(&options),
            busy_timeout: options.busy_timeout,
            cache_statements: options.cache_statements,
            options,
        }
    }

    /// Create and open a database in one step.
    ///
    /// # Errors
    /// Returns [`SqliteDbError`] if the engine cannot open the database or an open-time pragma
    /// fails.
    pub fn open_with(options: DatabaseOptions) -> Result<Self, SqliteDbError> {
        let mut db = Self::new(options);
        db.open()?;
        Ok(db)
    }

    /// Open a private in-memory database with default options.
    ///
    /// # Errors
    /// Returns [`SqliteDbError`] if the engine cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, SqliteDbError> {
        Self::open_with(DatabaseOptions::new(DatabasePath::Memory))
    }

    /// Open (or create) the database file at `path` with default options.
    ///
    /// # Errors
    /// Returns [`SqliteDbError`] if the engine cannot open the file.
    pub fn open_path(path: impl Into<DatabasePath>) -> Result<Self, SqliteDbError> {
        Self::open_with(DatabaseOptions::new(path))
    }

    /// Open the underlying connection. Opening an already open database is a no-op.
    ///
    /// # Errors
    /// Returns [`SqliteDbError`] if the engine refuses the path, flags or vfs, or if applying the
    /// busy timeout or journal mode fails.
    pub fn open(&mut self) -> Result<(), SqliteDbError> {
        if self.conn.is_some() {
            return Ok(());
        }
        let result = open_connection(&self.options, self.busy_timeout);
        let conn = self.shared.record(result)?;
        tracing::debug!(path = ?self.options.path, "opened sqlite database");
        self.conn = Some(conn);
        Ok(())
    }

    /// Close the connection, finalizing cached statements and closing open result sets.
    ///
    /// Closing an already closed database succeeds. If the engine refuses to close (for example
    /// because it is busy), the connection stays open and the error is returned.
    ///
    /// # Errors
    /// Returns [`SqliteDbError`] when the engine fails to close the handle.
    pub fn close(&mut self) -> Result<(), SqliteDbError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        self.shared.close_result_sets();
        conn.flush_prepared_statement_cache();
        self.shared
            .statements
            .borrow_mut()
            .retain(|_, stats| stats.handles > 0);
        match conn.close() {
            Ok(()) => {
                tracing::debug!(path = ?self.options.path, "closed sqlite database");
                Ok(())
            }
            Err((conn, err)) => {
                self.conn = Some(conn);
                self.shared.record(Err(SqliteDbError::SqliteError(err)))
            }
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Whether the database is open and a trivial query against the schema succeeds.
    #[must_use]
    pub fn good_connection(&self) -> bool {
        let Some(conn) = self.conn.as_ref() else {
            return false;
        };
        let check = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
            .and_then(|mut stmt| stmt.query([]).and_then(|mut rows| rows.next().map(|_| ())));
        check.is_ok()
    }

    /// Raw handle to the underlying `rusqlite` connection, when open.
    #[must_use]
    pub fn handle(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    pub(crate) fn connection(&self) -> Result<&Connection, SqliteDbError> {
        match self.conn.as_ref() {
            Some(conn) => Ok(conn),
            None => self.shared.record(Err(SqliteDbError::DatabaseClosed)),
        }
    }

    #[must_use]
    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    #[must_use]
    pub fn path(&self) -> &DatabasePath {
        &self.options.path
    }

    /// Path of the write-ahead log next to a file database.
    #[must_use]
    pub fn wal_path(&self) -> Option<PathBuf> {
        self.sibling_path("-wal")
    }

    /// Path of the shared-memory index next to a file database.
    #[must_use]
    pub fn shm_path(&self) -> Option<PathBuf> {
        self.sibling_path("-shm")
    }

    fn sibling_path(&self, suffix: &str) -> Option<PathBuf> {
        self.options.path.file().map(|path| {
            let mut name = path.as_os_str().to_owned();
            name.push(suffix);
            PathBuf::from(name)
        })
    }

    /// Set how long the engine retries when the database file is locked. Zero disables retry.
    ///
    /// # Errors
    /// Returns [`SqliteDbError`] if the engine rejects the timeout.
    pub fn set_max_busy_retry_time(&mut self, timeout: Duration) -> Result<(), SqliteDbError> {
        self.busy_timeout = timeout;
        if let Some(conn) = self.conn.as_ref() {
            let result = conn.busy_timeout(timeout).map_err(SqliteDbError::from);
            self.shared.record(result)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn max_busy_retry_time(&self) -> Duration {
        self.busy_timeout
    }

    /// Interrupt the statement currently running on this connection, if any.
    pub fn interrupt(&self) -> bool {
        match self.conn.as_ref() {
            Some(conn) => {
                conn.get_interrupt_handle().interrupt();
                true
            }
            None => false,
        }
    }

    /// Thread-safe handle that can interrupt this connection from elsewhere.
    #[must_use]
    pub fn interrupt_handle(&self) -> Option<InterruptHandle> {
        self.conn.as_ref().map(Connection::get_interrupt_handle)
    }

    #[must_use]
    pub fn last_error(&self) -> Option<super::LastError> {
        self.shared.last_error.borrow().clone()
    }

    /// Whether the most recent operation failed.
    #[must_use]
    pub fn had_error(&self) -> bool {
        self.shared.last_error.borrow().is_some()
    }

    /// Primary result code of the most recent operation (`0` when it succeeded).
    #[must_use]
    pub fn last_error_code(&self) -> i32 {
        self.shared.last_error.borrow().as_ref().map_or(0, |e| e.code)
    }

    #[must_use]
    pub fn last_extended_error_code(&self) -> i32 {
        self.shared
            .last_error
            .borrow()
            .as_ref()
            .map_or(0, |e| e.extended_code)
    }

    #[must_use]
    pub fn last_error_message(&self) -> String {
        self.shared
            .last_error
            .borrow()
            .as_ref()
            .map_or_else(|| "not an error".to_owned(), |e| e.message.clone())
    }

    pub fn set_logs_errors(&mut self, logs: bool) {
        self.shared.logs_errors = logs;
    }

    #[must_use]
    pub fn logs_errors(&self) -> bool {
        self.shared.logs_errors
    }

    pub fn set_trace_execution(&mut self, trace: bool) {
        self.shared.trace_execution = trace;
    }

    #[must_use]
    pub fn trace_execution(&self) -> bool {
        self.shared.trace_execution
    }

    /// Version string of the linked `SQLite` library.
    #[must_use]
    pub fn sqlite_lib_version() -> &'static str {
        rusqlite::version()
    }

    /// Version of this crate.
    #[must_use]
    pub fn crate_version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

fn open_connection(
    options: &DatabaseOptions,
    busy_timeout: Duration,
) -> Result<Connection, SqliteDbError> {
    let path = options.path.open_arg();
    let conn = match options.vfs.as_deref() {
        Some(vfs) => Connection::open_with_flags_and_vfs(path, options.flags, vfs)?,
        None => Connection::open_with_flags(path, options.flags)?,
    };
    conn.busy_timeout(busy_timeout)?;
    conn.set_prepared_statement_cache_capacity(options.statement_cache_capacity);
    if let Some(mode) = options.journal_mode {
        let applied: String =
            conn.pragma_update_and_check(None, "journal_mode", mode.as_str(), |row| row.get(0))?;
        tracing::debug!(requested = mode.as_str(), applied, "journal mode set");
    }
    Ok(conn)
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "failed to close sqlite database on drop");
        }
    }
}
