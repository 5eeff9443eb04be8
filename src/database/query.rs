use chrono::NaiveDateTime;

use crate::error::SqliteDbError;
use crate::params::NamedParams;
use crate::results::{ResultSet, Row};
use crate::results::result_set::{
    coerce_data, coerce_date, coerce_double, coerce_long, coerce_string,
};
use crate::statement::{Statement, StatementInfo};
use crate::types::SqlValue;

use super::Database;

impl Database {
    /// Prepare `sql`, taking it from the statement cache when caching is enabled.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::DatabaseClosed`] when not open, or the engine error for invalid SQL.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>, SqliteDbError> {
        let conn = self.connection()?;
        self.shared.trace_sql(sql);
        let result = Statement::prepare(conn, sql, &self.shared, self.cache_statements);
        self.shared.record(result)
    }

    /// Run a query and hand its lazy cursor to `f`.
    ///
    /// The cursor and its statement are released when `f` returns.
    ///
    /// # Errors
    /// Returns preparation and binding errors, or whatever `f` returns.
    pub fn query<R, F>(&self, sql: &str, params: &[SqlValue], f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut ResultSet<'_>) -> Result<R, SqliteDbError>,
    {
        let mut stmt = self.prepare(sql)?;
        let mut rs = stmt.query(params)?;
        let out = f(&mut rs);
        drop(rs);
        self.shared.record(out)
    }

    /// [`query`](Database::query) with parameters bound by name.
    ///
    /// # Errors
    /// Returns preparation and binding errors, or whatever `f` returns.
    pub fn query_named<R, F>(&self, sql: &str, params: &NamedParams, f: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut ResultSet<'_>) -> Result<R, SqliteDbError>,
    {
        let mut stmt = self.prepare(sql)?;
        let mut rs = stmt.query_named(params)?;
        let out = f(&mut rs);
        drop(rs);
        self.shared.record(out)
    }

    /// Run a query and collect every row.
    ///
    /// # Errors
    /// Returns preparation, binding or stepping errors.
    pub fn query_rows(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, SqliteDbError> {
        self.query(sql, params, |rs| rs.collect_rows())
    }

    /// First column of the first row, or `None` when there is no row or the value is NULL.
    ///
    /// # Errors
    /// Returns preparation, binding or stepping errors.
    pub fn value_for_query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<SqlValue>, SqliteDbError> {
        self.first_value(sql, params, SqlValue::clone)
    }

    /// # Errors
    /// Returns preparation, binding or stepping errors, or an out-of-range error when the value
    /// does not fit in an `i32`.
    pub fn int_for_query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<i32>, SqliteDbError> {
        self.long_for_query(sql, params)?
            .map(|value| {
                i32::try_from(value).map_err(|_| {
                    SqliteDbError::ExecutionError(format!(
                        "value {value} does not fit in a 32-bit integer"
                    ))
                })
            })
            .transpose()
    }

    /// # Errors
    /// Returns preparation, binding or stepping errors.
    pub fn long_for_query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<i64>, SqliteDbError> {
        self.first_value(sql, params, coerce_long)
    }

    /// # Errors
    /// Returns preparation, binding or stepping errors.
    pub fn bool_for_query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<bool>, SqliteDbError> {
        self.first_value(sql, params, |v| coerce_long(v) != 0)
    }

    /// # Errors
    /// Returns preparation, binding or stepping errors.
    pub fn double_for_query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<f64>, SqliteDbError> {
        self.first_value(sql, params, coerce_double)
    }

    /// # Errors
    /// Returns preparation, binding or stepping errors.
    pub fn string_for_query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<String>, SqliteDbError> {
        Ok(self.first_value(sql, params, coerce_string)?.flatten())
    }

    /// # Errors
    /// Returns preparation, binding or stepping errors.
    pub fn data_for_query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<Vec<u8>>, SqliteDbError> {
        Ok(self.first_value(sql, params, coerce_data)?.flatten())
    }

    /// # Errors
    /// Returns preparation, binding or stepping errors.
    pub fn date_for_query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<NaiveDateTime>, SqliteDbError> {
        let date_format = self.shared.date_format.clone();
        Ok(self
            .first_value(sql, params, |v| coerce_date(v, date_format.as_deref()))?
            .flatten())
    }

    fn first_value<T>(
        &self,
        sql: &str,
        params: &[SqlValue],
        read: impl FnOnce(&SqlValue) -> T,
    ) -> Result<Option<T>, SqliteDbError> {
        self.query(sql, params, |rs| {
            if !rs.next()? {
                return Ok(None);
            }
            let value = rs.value(0)?;
            Ok((!value.is_null()).then(|| read(&value)))
        })
    }

    #[must_use]
    pub fn should_cache_statements(&self) -> bool {
        self.cache_statements
    }

    /// Turn statement caching on or off. Turning it off empties the cache.
    pub fn set_should_cache_statements(&mut self, cache: bool) {
        if self.cache_statements == cache {
            return;
        }
        self.cache_statements = cache;
        if !cache {
            self.clear_cached_statements();
        }
    }

    /// Finalize every cached statement that is not currently in use.
    pub fn clear_cached_statements(&self) {
        if let Some(conn) = self.conn.as_ref() {
            conn.flush_prepared_statement_cache();
        }
        self.shared
            .statements
            .borrow_mut()
            .retain(|_, stats| stats.handles > 0);
        tracing::debug!("cleared cached statements");
    }

    /// Snapshot of the statement cache bookkeeping, ordered by SQL text.
    #[must_use]
    pub fn cached_statements(&self) -> Vec<StatementInfo> {
        let mut infos: Vec<StatementInfo> = self
            .shared
            .statements
            .borrow()
            .iter()
            .map(|(sql, stats)| StatementInfo {
                query: sql.clone(),
                use_count: stats.use_count,
                in_use: stats.handles > 0,
            })
            .collect();
        infos.sort_by(|a, b| a.query.cmp(&b.query));
        infos
    }

    #[must_use]
    pub fn has_open_result_sets(&self) -> bool {
        self.shared.open_result_sets.get() > 0
    }

    /// Close every live cursor on this connection; they report no further rows.
    pub fn close_open_result_sets(&self) {
        self.shared.close_result_sets();
    }
}
