// Serial queue - one worker thread owns one Database and runs submitted closures in order.
//
// Split into:
// - channel: command and reply types sent to the worker
// - dispatcher: the worker loop
// - worker: thread spawn, request/response plumbing, interrupt handle

mod channel;
mod dispatcher;
mod worker;

use std::sync::Arc;

use crate::config::{DatabaseOptions, DatabasePath};
use crate::database::{Database, TransactionKind, TxOutcome};
use crate::error::SqliteDbError;

use worker::QueueWorker;

/// Thread-safe access to a single [`Database`] through a dedicated worker thread.
///
/// Every closure submitted through a queue (or any of its clones) runs on the worker, one at a
/// time, in submission order. The database is opened lazily on first use and re-opened after
/// [`close`](DatabaseQueue::close). The worker stops when the last clone is dropped.
///
/// ```rust,no_run
/// use sqlite_middleware::prelude::*;
///
/// # async fn demo() -> Result<(), SqliteDbError> {
/// let queue = DatabaseQueue::open_path("app.db")?;
/// queue
///     .in_database(|db| db.execute_statements("CREATE TABLE IF NOT EXISTS t (x INTEGER)"))
///     .await?;
/// let inserted = queue
///     .in_transaction(|db| {
///         let n = db.execute_update("INSERT INTO t (x) VALUES (?)", &[SqlValue::Int(1)])?;
///         Ok(TxOutcome::Commit(n))
///     })
///     .await?;
/// assert_eq!(inserted, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DatabaseQueue {
    worker: Arc<QueueWorker>,
}

impl DatabaseQueue {
    /// Start a queue for `options`. The database itself is opened by the first submitted closure.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ConnectionError`] if the worker thread cannot be spawned.
    pub fn open(options: DatabaseOptions) -> Result<Self, SqliteDbError> {
        Ok(Self {
            worker: Arc::new(QueueWorker::spawn(options)?),
        })
    }

    /// Start a queue for the database at `path` with default options.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ConnectionError`] if the worker thread cannot be spawned.
    pub fn open_path(path: impl Into<DatabasePath>) -> Result<Self, SqliteDbError> {
        Self::open(DatabaseOptions::new(path))
    }

    /// Run `f` on the worker and await its result.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ReentrantQueue`] when called from inside one of this queue's own
    /// closures, an open error if the database cannot be opened, or whatever `f` returns. A
    /// panicking closure is reported as [`SqliteDbError::ExecutionError`].
    pub async fn in_database<F, R>(&self, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<R, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker.run(f).await
    }

    /// Run `f` on the worker, blocking the current thread until it finishes.
    ///
    /// # Errors
    /// See [`in_database`](DatabaseQueue::in_database).
    pub fn in_database_blocking<F, R>(&self, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<R, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker.run_blocking(f)
    }

    /// Run `f` inside an exclusive transaction on the worker.
    ///
    /// # Errors
    /// See [`Database::run_transaction`].
    pub async fn in_transaction<F, R>(&self, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<TxOutcome<R>, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.transaction(TransactionKind::Exclusive, f).await
    }

    /// # Errors
    /// See [`Database::run_transaction`].
    pub async fn in_deferred_transaction<F, R>(&self, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<TxOutcome<R>, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.transaction(TransactionKind::Deferred, f).await
    }

    /// # Errors
    /// See [`Database::run_transaction`].
    pub async fn in_immediate_transaction<F, R>(&self, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<TxOutcome<R>, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.transaction(TransactionKind::Immediate, f).await
    }

    /// Blocking form of [`in_transaction`](DatabaseQueue::in_transaction).
    ///
    /// # Errors
    /// See [`Database::run_transaction`].
    pub fn in_transaction_blocking<F, R>(&self, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<TxOutcome<R>, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker
            .run_blocking(move |db| db.run_transaction(TransactionKind::Exclusive, f))
    }

    /// Run `f` inside a savepoint on the worker.
    ///
    /// # Errors
    /// See [`Database::in_savepoint`].
    pub async fn in_savepoint<F, R>(&self, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<TxOutcome<R>, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker.run(move |db| db.in_savepoint(f)).await
    }

    async fn transaction<F, R>(&self, kind: TransactionKind, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<TxOutcome<R>, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker.run(move |db| db.run_transaction(kind, f)).await
    }

    /// Close the database on the worker. The queue stays usable and re-opens on next use.
    ///
    /// # Errors
    /// Returns the engine error if the connection refuses to close.
    pub async fn close(&self) -> Result<(), SqliteDbError> {
        self.worker.close().await
    }

    /// # Errors
    /// See [`close`](DatabaseQueue::close).
    pub fn close_blocking(&self) -> Result<(), SqliteDbError> {
        self.worker.close_blocking()
    }

    /// Interrupt the statement the worker is running, from any thread. Returns `false` when the
    /// database is not open.
    pub fn interrupt(&self) -> bool {
        self.worker.interrupt()
    }

    #[must_use]
    pub fn path(&self) -> &DatabasePath {
        &self.worker.options().path
    }

    #[must_use]
    pub fn options(&self) -> &DatabaseOptions {
        self.worker.options()
    }
}

impl std::fmt::Debug for DatabaseQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseQueue")
            .field("path", self.path())
            .finish_non_exhaustive()
    }
}
