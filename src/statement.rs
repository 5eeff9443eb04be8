use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use rusqlite::{CachedStatement, Connection};

use crate::database::Shared;
use crate::error::SqliteDbError;
use crate::params::{NamedParams, Params, check_parameter_count, named_refs};
use crate::results::ResultSet;
use crate::types::SqlValue;

/// Snapshot of one entry in a connection's statement cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementInfo {
    /// SQL text the statement was prepared from (the cache key).
    pub query: String,
    /// How many times this SQL text has been handed out from the cache.
    pub use_count: u64,
    /// Whether a [`Statement`] handle for this SQL is currently alive.
    pub in_use: bool,
}

enum Handle<'db> {
    Cached(CachedStatement<'db>),
    Fresh(rusqlite::Statement<'db>),
}

impl<'db> Deref for Handle<'db> {
    type Target = rusqlite::Statement<'db>;

    fn deref(&self) -> &Self::Target {
        match self {
            Handle::Cached(stmt) => stmt,
            Handle::Fresh(stmt) => stmt,
        }
    }
}

impl DerefMut for Handle<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Handle::Cached(stmt) => stmt,
            Handle::Fresh(stmt) => stmt,
        }
    }
}

/// Prepared statement borrowed from a [`Database`](crate::Database).
///
/// When statement caching is enabled the handle comes from the connection's cache and goes back
/// to it (reset, bindings cleared) when dropped; otherwise it is finalized on drop.
pub struct Statement<'db> {
    handle: Handle<'db>,
    sql: String,
    shared: &'db Shared,
    cached: bool,
}

impl<'db> Statement<'db> {
    pub(crate) fn prepare(
        conn: &'db Connection,
        sql: &str,
        shared: &'db Shared,
        cache: bool,
    ) -> Result<Self, SqliteDbError> {
        let handle = if cache {
            let stmt = conn.prepare_cached(sql)?;
            let mut statements = shared.statements.borrow_mut();
            let stats = statements.entry(sql.to_owned()).or_default();
            stats.use_count += 1;
            stats.handles += 1;
            Handle::Cached(stmt)
        } else {
            Handle::Fresh(conn.prepare(sql)?)
        };
        Ok(Self {
            handle,
            sql: sql.to_owned(),
            shared,
            cached: cache,
        })
    }

    /// Access the raw SQL string of the prepared statement.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.handle.parameter_count()
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.handle.column_count()
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.handle
            .column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect()
    }

    /// Whether the statement only reads from the database.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.handle.readonly()
    }

    /// Run the statement with positional parameters and return the affected row count.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ParameterError`] on a parameter count mismatch, or the engine
    /// error if execution fails or the statement produces rows.
    pub fn execute(&mut self, params: &[SqlValue]) -> Result<usize, SqliteDbError> {
        let shared = self.shared;
        let result = self.execute_positional(params);
        shared.record(result)
    }

    /// Run the statement binding parameters by name.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ParameterError`] when the number of names differs from the
    /// statement's parameter count, or the engine error if a name is unknown or execution fails.
    pub fn execute_named(&mut self, params: &NamedParams) -> Result<usize, SqliteDbError> {
        let shared = self.shared;
        if let Err(err) = check_parameter_count(self.parameter_count(), params.len(), &self.sql) {
            return shared.record(Err(err));
        }
        let converted = params.convert(shared.date_format());
        let refs = named_refs(&converted);
        let result = self.handle.execute(&refs[..]).map_err(SqliteDbError::from);
        shared.record(result)
    }

    /// Run the statement as a query and return a forward-only cursor over its rows.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ParameterError`] on a parameter count mismatch, or the engine
    /// error if binding fails.
    pub fn query(&mut self, params: &[SqlValue]) -> Result<ResultSet<'_>, SqliteDbError> {
        let shared = self.shared;
        if let Err(err) = check_parameter_count(self.parameter_count(), params.len(), &self.sql) {
            return shared.record(Err(err));
        }
        let converted = Params::convert(params, shared.date_format());
        let columns = Arc::new(self.column_names());
        let refs = converted.as_refs();
        let result = self
            .handle
            .query(&refs[..])
            .map(|rows| ResultSet::new(rows, columns, shared))
            .map_err(SqliteDbError::from);
        shared.record(result)
    }

    /// Run the statement as a query binding parameters by name.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ParameterError`] on a parameter count mismatch, or the engine
    /// error if a name is unknown or binding fails.
    pub fn query_named(&mut self, params: &NamedParams) -> Result<ResultSet<'_>, SqliteDbError> {
        let shared = self.shared;
        if let Err(err) = check_parameter_count(self.parameter_count(), params.len(), &self.sql) {
            return shared.record(Err(err));
        }
        let converted = params.convert(shared.date_format());
        let columns = Arc::new(self.column_names());
        let refs = named_refs(&converted);
        let result = self
            .handle
            .query(&refs[..])
            .map(|rows| ResultSet::new(rows, columns, shared))
            .map_err(SqliteDbError::from);
        shared.record(result)
    }

    fn execute_positional(&mut self, params: &[SqlValue]) -> Result<usize, SqliteDbError> {
        check_parameter_count(self.parameter_count(), params.len(), &self.sql)?;
        let converted = Params::convert(params, self.shared.date_format());
        let refs = converted.as_refs();
        Ok(self.handle.execute(&refs[..])?)
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        if self.cached {
            if let Some(stats) = self.shared.statements.borrow_mut().get_mut(&self.sql) {
                stats.handles = stats.handles.saturating_sub(1);
            }
        }
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("cached", &self.cached)
            .finish()
    }
}
