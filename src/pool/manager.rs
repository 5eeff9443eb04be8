use std::future::Future;
use std::sync::Arc;

use bb8::ManageConnection;

use crate::config::DatabaseOptions;
use crate::database::Database;
use crate::error::SqliteDbError;

/// Hooks consulted whenever the pool creates a new [`Database`].
pub trait PoolDelegate: Send + Sync + 'static {
    /// Return `false` to refuse the freshly opened database; the checkout then fails with
    /// [`SqliteDbError::PoolRejected`].
    fn should_add_database(&self, _db: &Database) -> bool {
        true
    }

    /// Called after a database was accepted into the pool, before its first checkout.
    fn did_add_database(&self, _db: &mut Database) {}
}

/// bb8 manager that opens one [`Database`] per pooled connection.
pub struct DatabaseManager {
    options: DatabaseOptions,
    delegate: Option<Arc<dyn PoolDelegate>>,
}

impl DatabaseManager {
    #[must_use]
    pub fn new(options: DatabaseOptions, delegate: Option<Arc<dyn PoolDelegate>>) -> Self {
        Self { options, delegate }
    }
}

impl ManageConnection for DatabaseManager {
    type Connection = Database;
    type Error = SqliteDbError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let options = self.options.clone();
        let delegate = self.delegate.clone();
        async move {
            tokio::task::spawn_blocking(move || open_pooled(options, delegate.as_deref()))
                .await
                .map_err(|e| {
                    SqliteDbError::ExecutionError(format!("pool open join error: {e}"))
                })?
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move {
            if conn.good_connection() {
                Ok(())
            } else {
                Err(SqliteDbError::ConnectionError(
                    "pooled database failed validation".into(),
                ))
            }
        }
    }

    // A connection handed back mid-transaction (e.g. after a panic) is not reused.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        !conn.is_open() || conn.in_transaction()
    }
}

fn open_pooled(
    options: DatabaseOptions,
    delegate: Option<&dyn PoolDelegate>,
) -> Result<Database, SqliteDbError> {
    let mut db = Database::open_with(options)?;
    if let Some(delegate) = delegate {
        if !delegate.should_add_database(&db) {
            if let Err(err) = db.close() {
                tracing::warn!(error = %err, "failed to close rejected pool database");
            }
            return Err(SqliteDbError::PoolRejected);
        }
        delegate.did_add_database(&mut db);
    }
    tracing::debug!(path = ?db.path(), "pool opened database");
    Ok(db)
}
