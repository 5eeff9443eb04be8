use std::collections::HashMap;
use std::ops::ControlFlow;

use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::types::ValueRef;

use crate::error::SqliteDbError;
use crate::params::NamedParams;
use crate::types::SqlValue;

use super::Database;

/// Text rendering of one row handed to [`Database::execute_statements_with`].
pub type RowDictionary = HashMap<String, Option<String>>;

impl Database {
    /// Execute a single statement that returns no rows (INSERT/UPDATE/DELETE/DDL) and return the
    /// number of affected rows.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ParameterError`] on a parameter count mismatch, or the engine error
    /// if preparing or stepping fails (including a statement that produces rows).
    pub fn execute_update(&self, sql: &str, params: &[SqlValue]) -> Result<usize, SqliteDbError> {
        let mut stmt = self.prepare(sql)?;
        stmt.execute(params)
    }

    /// Execute a single statement binding parameters by name.
    ///
    /// # Errors
    /// Returns the engine error if a name does not appear in the statement or execution fails.
    pub fn execute_update_named(
        &self,
        sql: &str,
        params: &NamedParams,
    ) -> Result<usize, SqliteDbError> {
        let mut stmt = self.prepare(sql)?;
        stmt.execute_named(params)
    }

    /// Execute every statement in `sql`, separated by semicolons.
    ///
    /// # Errors
    /// Returns the engine error of the first failing statement; earlier statements stay applied.
    pub fn execute_statements(&self, sql: &str) -> Result<(), SqliteDbError> {
        let conn = self.connection()?;
        self.shared.trace_sql(sql);
        let result = conn.execute_batch(sql).map_err(SqliteDbError::from);
        self.shared.record(result)
    }

    /// Execute every statement in `sql`, calling `callback` with each produced row rendered as
    /// text. Returning [`ControlFlow::Break`] stops the batch.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::Aborted`] when the callback breaks, or the engine error of the first
    /// failing statement.
    pub fn execute_statements_with<F>(&self, sql: &str, mut callback: F) -> Result<(), SqliteDbError>
    where
        F: FnMut(&RowDictionary) -> ControlFlow<()>,
    {
        let conn = self.connection()?;
        self.shared.trace_sql(sql);
        let result = run_batch_with_rows(conn, sql, &mut callback);
        self.shared.record(result)
    }

    /// Rowid of the most recent successful INSERT on this connection.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::DatabaseClosed`] when the database is not open.
    pub fn last_insert_rowid(&self) -> Result<i64, SqliteDbError> {
        Ok(self.connection()?.last_insert_rowid())
    }

    /// Rows changed by the most recent INSERT/UPDATE/DELETE on this connection.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::DatabaseClosed`] when the database is not open.
    pub fn changes(&self) -> Result<u64, SqliteDbError> {
        let changes = self.connection()?.changes();
        Ok(u64::try_from(changes).unwrap_or(u64::MAX))
    }
}

fn run_batch_with_rows<F>(
    conn: &rusqlite::Connection,
    sql: &str,
    callback: &mut F,
) -> Result<(), SqliteDbError>
where
    F: FnMut(&RowDictionary) -> ControlFlow<()>,
{
    let mut batch = rusqlite::Batch::new(conn, sql);
    while let Some(mut stmt) = batch.next()? {
        let column_names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut dictionary = RowDictionary::with_capacity(column_names.len());
            for (idx, name) in column_names.iter().enumerate() {
                dictionary.insert(name.clone(), value_as_text(row.get_ref(idx)?));
            }
            if callback(&dictionary).is_break() {
                return Err(SqliteDbError::Aborted);
            }
        }
    }
    Ok(())
}

fn value_as_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
