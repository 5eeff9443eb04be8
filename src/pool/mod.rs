pub mod manager;

pub use manager::{DatabaseManager, PoolDelegate};

use std::sync::{Arc, RwLock};
use std::time::Duration;

use bb8::Pool;

use crate::config::{DatabaseOptions, DatabasePath};
use crate::database::{Database, TransactionKind, TxOutcome};
use crate::error::SqliteDbError;

/// Limits applied to a [`DatabasePool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of databases the pool may have open at once; `None` for no limit.
    pub max_databases: Option<u32>,
    /// How long a checkout waits for a free database before failing.
    pub connection_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_databases: None,
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    fn max_size(&self) -> Result<u32, SqliteDbError> {
        match self.max_databases {
            Some(0) => Err(SqliteDbError::ConfigError(
                "max_databases must be greater than zero".into(),
            )),
            Some(max) => Ok(max),
            None => Ok(u32::MAX),
        }
    }
}

/// A pool of [`Database`] connections to the same file.
///
/// Each call checks a database out, runs the closure on a blocking thread and checks it back
/// in. SQLite allows one writer at a time, so a pool suits read-heavy workloads; use a
/// [`DatabaseQueue`](crate::DatabaseQueue) to serialize writes.
pub struct DatabasePool {
    pool: RwLock<Pool<DatabaseManager>>,
    options: DatabaseOptions,
    config: PoolConfig,
    delegate: Option<Arc<dyn PoolDelegate>>,
}

impl DatabasePool {
    /// Pool with default limits.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ConfigError`] for an invalid configuration.
    pub fn new(options: DatabaseOptions) -> Result<Self, SqliteDbError> {
        Self::with_config(options, PoolConfig::default())
    }

    /// Pool for the database at `path` with default options and limits.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ConfigError`] for an invalid configuration.
    pub fn open_path(path: impl Into<DatabasePath>) -> Result<Self, SqliteDbError> {
        Self::new(DatabaseOptions::new(path))
    }

    /// # Errors
    /// Returns [`SqliteDbError::ConfigError`] when `max_databases` is zero.
    pub fn with_config(options: DatabaseOptions, config: PoolConfig) -> Result<Self, SqliteDbError> {
        Self::build(options, config, None)
    }

    /// Pool whose new databases are vetted by `delegate`.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ConfigError`] when `max_databases` is zero.
    pub fn with_delegate(
        options: DatabaseOptions,
        config: PoolConfig,
        delegate: Arc<dyn PoolDelegate>,
    ) -> Result<Self, SqliteDbError> {
        Self::build(options, config, Some(delegate))
    }

    fn build(
        options: DatabaseOptions,
        config: PoolConfig,
        delegate: Option<Arc<dyn PoolDelegate>>,
    ) -> Result<Self, SqliteDbError> {
        let pool = build_pool(&options, &config, delegate.clone())?;
        Ok(Self {
            pool: RwLock::new(pool),
            options,
            config,
            delegate,
        })
    }

    fn current_pool(&self) -> Pool<DatabaseManager> {
        match self.pool.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Check out a database, run `f` with it on a blocking thread, and check it back in.
    ///
    /// # Errors
    /// Returns open, validation or delegate errors from the checkout, a timeout as
    /// [`SqliteDbError::ConnectionError`], or whatever `f` returns.
    pub async fn in_database<F, R>(&self, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<R, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        let pool = self.current_pool();
        let mut conn = pool.get_owned().await?;
        tracing::debug!("checked out pooled database");
        tokio::task::spawn_blocking(move || {
            let result = f(&mut *conn);
            drop(conn);
            result
        })
        .await
        .map_err(|e| SqliteDbError::ExecutionError(format!("pool spawn_blocking join error: {e}")))?
    }

    /// Run `f` inside an exclusive transaction on a pooled database.
    ///
    /// # Errors
    /// See [`Database::run_transaction`].
    pub async fn in_transaction<F, R>(&self, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<TxOutcome<R>, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.in_database(move |db| db.run_transaction(TransactionKind::Exclusive, f))
            .await
    }

    /// # Errors
    /// See [`Database::run_transaction`].
    pub async fn in_deferred_transaction<F, R>(&self, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<TxOutcome<R>, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.in_database(move |db| db.run_transaction(TransactionKind::Deferred, f))
            .await
    }

    /// # Errors
    /// See [`Database::in_savepoint`].
    pub async fn in_savepoint<F, R>(&self, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<TxOutcome<R>, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.in_database(move |db| db.in_savepoint(f)).await
    }

    /// Databases open and waiting in the pool.
    #[must_use]
    pub fn count_of_checked_in_databases(&self) -> u32 {
        self.current_pool().state().idle_connections
    }

    /// Databases currently lent out to callers.
    #[must_use]
    pub fn count_of_checked_out_databases(&self) -> u32 {
        let state = self.current_pool().state();
        state.connections.saturating_sub(state.idle_connections)
    }

    #[must_use]
    pub fn count_of_open_databases(&self) -> u32 {
        self.current_pool().state().connections
    }

    /// Close every idle database and start over with an empty pool. Databases checked out at
    /// this moment close when they are returned.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ConfigError`] if the replacement pool cannot be built.
    pub fn release_all_databases(&self) -> Result<(), SqliteDbError> {
        let fresh = build_pool(&self.options, &self.config, self.delegate.clone())?;
        let old = match self.pool.write() {
            Ok(mut guard) => std::mem::replace(&mut *guard, fresh),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), fresh),
        };
        tracing::debug!(
            released = old.state().idle_connections,
            "released pooled databases"
        );
        drop(old);
        Ok(())
    }

    #[must_use]
    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub fn path(&self) -> &DatabasePath {
        &self.options.path
    }
}

impl std::fmt::Debug for DatabasePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabasePool")
            .field("path", &self.options.path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn build_pool(
    options: &DatabaseOptions,
    config: &PoolConfig,
    delegate: Option<Arc<dyn PoolDelegate>>,
) -> Result<Pool<DatabaseManager>, SqliteDbError> {
    let manager = DatabaseManager::new(options.clone(), delegate);
    Ok(Pool::builder()
        .max_size(config.max_size()?)
        .connection_timeout(config.connection_timeout)
        .idle_timeout(None)
        .max_lifetime(None)
        .retry_connection(false)
        .test_on_check_out(true)
        .build_unchecked(manager))
}
