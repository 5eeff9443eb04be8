use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::SqliteDbError;

use super::Database;

const ROLLBACK_BUSY_RETRIES: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
];

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// What a transaction or savepoint closure wants done with its work, carrying the value to
/// return to the caller either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome<R> {
    Commit(R),
    Rollback(R),
}

impl<R> TxOutcome<R> {
    /// The carried value, whichever way the work went.
    pub fn into_inner(self) -> R {
        match self {
            TxOutcome::Commit(value) | TxOutcome::Rollback(value) => value,
        }
    }

    #[must_use]
    pub fn is_commit(&self) -> bool {
        matches!(self, TxOutcome::Commit(_))
    }
}

/// Locking behavior of `BEGIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionKind {
    /// Locks are taken on first read/write.
    #[default]
    Deferred,
    /// Takes the write lock immediately.
    Immediate,
    /// Takes the write lock and blocks readers outside WAL mode.
    Exclusive,
}

impl TransactionKind {
    fn begin_sql(self) -> &'static str {
        match self {
            TransactionKind::Deferred => "BEGIN DEFERRED TRANSACTION",
            TransactionKind::Immediate => "BEGIN IMMEDIATE TRANSACTION",
            TransactionKind::Exclusive => "BEGIN EXCLUSIVE TRANSACTION",
        }
    }
}

impl Database {
    /// Begin an exclusive transaction.
    ///
    /// # Errors
    /// Returns the engine error, including when a transaction is already active.
    pub fn begin_transaction(&self) -> Result<(), SqliteDbError> {
        self.begin(TransactionKind::Exclusive)
    }

    /// # Errors
    /// Returns the engine error, including when a transaction is already active.
    pub fn begin_deferred_transaction(&self) -> Result<(), SqliteDbError> {
        self.begin(TransactionKind::Deferred)
    }

    /// # Errors
    /// Returns the engine error, including when a transaction is already active.
    pub fn begin_immediate_transaction(&self) -> Result<(), SqliteDbError> {
        self.begin(TransactionKind::Immediate)
    }

    /// Begin a transaction of the given kind.
    ///
    /// # Errors
    /// Returns the engine error, including when a transaction is already active.
    pub fn begin(&self, kind: TransactionKind) -> Result<(), SqliteDbError> {
        self.execute_statements(kind.begin_sql())?;
        tracing::debug!(?kind, "sqlite transaction started");
        Ok(())
    }

    /// # Errors
    /// Returns the engine error, including when no transaction is active.
    pub fn commit(&self) -> Result<(), SqliteDbError> {
        self.execute_statements("COMMIT TRANSACTION")?;
        tracing::debug!("sqlite transaction committed");
        Ok(())
    }

    /// Roll back the active transaction, retrying briefly while the database is busy.
    ///
    /// # Errors
    /// Returns the engine error once retries are exhausted, or when no transaction is active.
    pub fn rollback(&self) -> Result<(), SqliteDbError> {
        for (idx, delay) in ROLLBACK_BUSY_RETRIES.iter().copied().enumerate() {
            match self.execute_statements("ROLLBACK TRANSACTION") {
                Ok(()) => {
                    tracing::debug!("sqlite transaction rolled back");
                    return Ok(());
                }
                Err(err) if err.is_busy() && idx + 1 < ROLLBACK_BUSY_RETRIES.len() => {
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
        Err(SqliteDbError::ExecutionError(
            "rollback retries exhausted".into(),
        ))
    }

    /// Whether a transaction is active on this connection.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.conn.as_ref().is_some_and(|conn| !conn.is_autocommit())
    }

    /// # Errors
    /// Returns the engine error.
    pub fn start_savepoint(&self, name: &str) -> Result<(), SqliteDbError> {
        self.execute_statements(&format!("SAVEPOINT {};", quote_savepoint_name(name)))
    }

    /// # Errors
    /// Returns the engine error, including for an unknown savepoint.
    pub fn release_savepoint(&self, name: &str) -> Result<(), SqliteDbError> {
        self.execute_statements(&format!("RELEASE SAVEPOINT {};", quote_savepoint_name(name)))
    }

    /// # Errors
    /// Returns the engine error, including for an unknown savepoint.
    pub fn rollback_to_savepoint(&self, name: &str) -> Result<(), SqliteDbError> {
        self.execute_statements(&format!(
            "ROLLBACK TRANSACTION TO SAVEPOINT {};",
            quote_savepoint_name(name)
        ))
    }

    /// Run `f` inside a transaction of `kind`, committing on [`TxOutcome::Commit`] and rolling
    /// back on [`TxOutcome::Rollback`] or error.
    ///
    /// # Errors
    /// Returns errors from `BEGIN`, `f` or `COMMIT`. When `f` fails its error wins over a failed
    /// rollback, which is only logged.
    pub fn run_transaction<R, F>(&mut self, kind: TransactionKind, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<TxOutcome<R>, SqliteDbError>,
    {
        self.begin(kind)?;
        match f(self) {
            Ok(TxOutcome::Commit(value)) => {
                if let Err(err) = self.commit() {
                    self.rollback_after_failure();
                    return Err(err);
                }
                Ok(value)
            }
            Ok(TxOutcome::Rollback(value)) => {
                self.rollback()?;
                Ok(value)
            }
            Err(err) => {
                self.rollback_after_failure();
                Err(err)
            }
        }
    }

    /// Run `f` inside a freshly named savepoint. Rolls back to it on [`TxOutcome::Rollback`] or
    /// error, and always releases it.
    ///
    /// # Errors
    /// Returns errors from the savepoint statements or from `f`.
    pub fn in_savepoint<R, F>(&mut self, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<TxOutcome<R>, SqliteDbError>,
    {
        let name = next_savepoint_name();
        self.start_savepoint(&name)?;
        let result = f(self);
        let rolled_back = match &result {
            Ok(TxOutcome::Commit(_)) => Ok(()),
            Ok(TxOutcome::Rollback(_)) | Err(_) => self.rollback_to_savepoint(&name),
        };
        let released = self.release_savepoint(&name);
        let value = result?.into_inner();
        rolled_back?;
        released?;
        Ok(value)
    }

    fn rollback_after_failure(&self) {
        if !self.in_transaction() {
            return;
        }
        if let Err(err) = self.rollback() {
            tracing::warn!(error = %err, "rollback after failed transaction also failed");
        }
    }
}

/// Quote a savepoint name as an SQL string literal.
pub(crate) fn quote_savepoint_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// Unique savepoint name for [`Database::in_savepoint`].
pub(crate) fn next_savepoint_name() -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("sp_{n}")
}
