use std::panic::AssertUnwindSafe;

use chrono::NaiveDateTime;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::Value;

use crate::error::SqliteDbError;
use crate::params::{from_value_ref, to_sqlite_value};
use crate::results::result_set::parse_with_format;
use crate::types::{SqlValue, format_timestamp};

use super::Database;

impl Database {
    /// Register a scalar SQL function. `n_args` of `-1` accepts any number of arguments.
    ///
    /// An `Err` returned by `f` is raised as an SQL error carrying that message.
    ///
    /// ```rust
    /// use sqlite_middleware::prelude::*;
    ///
    /// # fn main() -> Result<(), SqliteDbError> {
    /// let db = Database::open_in_memory()?;
    /// db.make_function("double_it", 1, |args| match args[0].as_int() {
    ///     Some(n) => Ok(SqlValue::Int(n * 2)),
    ///     None => Err("double_it expects an integer".to_owned()),
    /// })?;
    /// assert_eq!(db.long_for_query("SELECT double_it(21)", &[])?, Some(42));
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns the engine error if the function cannot be registered.
    pub fn make_function<F>(&self, name: &str, n_args: i32, f: F) -> Result<(), SqliteDbError>
    where
        F: Fn(&[SqlValue]) -> Result<SqlValue, String> + Send + 'static,
    {
        let conn = self.connection()?;
        let date_format = self.shared.date_format.clone();
        let f = AssertUnwindSafe(f);
        let result = conn
            .create_scalar_function(
                name,
                n_args,
                FunctionFlags::SQLITE_UTF8,
                move |ctx: &Context<'_>| -> rusqlite::Result<Value> {
                    let args = (0..ctx.len())
                        .map(|idx| from_value_ref(ctx.get_raw(idx)))
                        .collect::<Vec<_>>();
                    let value = (*f)(&args).map_err(|msg| rusqlite::Error::UserFunctionError(msg.into()))?;
                    Ok(to_sqlite_value(&value, date_format.as_deref()))
                },
            )
            .map_err(SqliteDbError::from);
        if result.is_ok() {
            tracing::debug!(name, n_args, "registered sql function");
        }
        self.shared.record(result)
    }

    /// Format used to store and parse timestamps as TEXT. `None` stores them as REAL epoch
    /// seconds.
    pub fn set_date_format(&mut self, format: Option<String>) {
        self.shared.date_format.clone_from(&format);
        self.options.date_format = format;
    }

    #[must_use]
    pub fn has_date_format(&self) -> bool {
        self.shared.date_format.is_some()
    }

    /// Parse `s` with the configured date format; `None` without a format or on mismatch.
    #[must_use]
    pub fn date_from_string(&self, s: &str) -> Option<NaiveDateTime> {
        self.shared
            .date_format()
            .and_then(|fmt| parse_with_format(s, fmt))
    }

    /// Render `date` with the configured date format; `None` without a (valid) format.
    #[must_use]
    pub fn string_from_date(&self, date: &NaiveDateTime) -> Option<String> {
        self.shared
            .date_format()
            .and_then(|fmt| format_timestamp(date, fmt))
    }
}
