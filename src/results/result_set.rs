use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use super::row::Row;
use crate::database::Shared;
use crate::error::SqliteDbError;
use crate::params::from_value_ref;
use crate::types::{SqlValue, ValueType, parse_timestamp_text, timestamp_from_epoch_seconds};

/// Something that names a column of a result: its position or its (case-insensitive) name.
pub trait ColumnIndex {
    /// Resolve to a position in `names`.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ColumnIndexOutOfRange`] or [`SqliteDbError::ColumnNotFound`].
    fn resolve(
        &self,
        names: &[String],
        cache: &HashMap<String, usize>,
    ) -> Result<usize, SqliteDbError>;
}

impl ColumnIndex for usize {
    fn resolve(
        &self,
        names: &[String],
        _cache: &HashMap<String, usize>,
    ) -> Result<usize, SqliteDbError> {
        if *self < names.len() {
            Ok(*self)
        } else {
            Err(SqliteDbError::ColumnIndexOutOfRange {
                index: *self,
                count: names.len(),
            })
        }
    }
}

impl ColumnIndex for &str {
    fn resolve(
        &self,
        _names: &[String],
        cache: &HashMap<String, usize>,
    ) -> Result<usize, SqliteDbError> {
        cache
            .get(&self.to_lowercase())
            .copied()
            .ok_or_else(|| SqliteDbError::ColumnNotFound((*self).to_owned()))
    }
}

impl ColumnIndex for String {
    fn resolve(
        &self,
        names: &[String],
        cache: &HashMap<String, usize>,
    ) -> Result<usize, SqliteDbError> {
        self.as_str().resolve(names, cache)
    }
}

/// Lazy, forward-only cursor over the rows of a running query.
///
/// Each call to [`next`](ResultSet::next) steps the statement once and copies that row's values;
/// nothing beyond the current row is read. Once exhausted or closed the cursor keeps returning
/// `false` and cannot be restarted.
///
/// ```rust,no_run
/// use sqlite_middleware::prelude::*;
///
/// # fn demo(db: &Database) -> Result<(), SqliteDbError> {
/// db.query("SELECT id, name FROM users", &[], |rs| {
///     while rs.next()? {
///         println!("{} {}", rs.long("id")?, rs.string("name")?.unwrap_or_default());
///     }
///     Ok(())
/// })?;
/// # Ok(())
/// # }
/// ```
pub struct ResultSet<'stmt> {
    rows: rusqlite::Rows<'stmt>,
    column_names: Arc<Vec<String>>,
    column_index_cache: Arc<HashMap<String, usize>>,
    current: Option<Vec<SqlValue>>,
    shared: &'stmt Shared,
    generation: u64,
    closed: bool,
}

impl<'stmt> ResultSet<'stmt> {
    pub(crate) fn new(
        rows: rusqlite::Rows<'stmt>,
        column_names: Arc<Vec<String>>,
        shared: &'stmt Shared,
    ) -> Self {
        let column_index_cache = super::build_index_cache(&column_names);
        let generation = shared.result_set_opened();
        Self {
            rows,
            column_names,
            column_index_cache,
            current: None,
            shared,
            generation,
            closed: false,
        }
    }

    /// Advance to the next row. Returns `false` once the rows are exhausted.
    ///
    /// # Errors
    /// Returns the engine error if stepping fails (the cursor is closed afterwards).
    pub fn next(&mut self) -> Result<bool, SqliteDbError> {
        if self.closed {
            return Ok(false);
        }
        if !self.shared.is_result_set_live(self.generation) {
            self.closed = true;
            self.current = None;
            return Ok(false);
        }
        match self.step() {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.close();
                Ok(false)
            }
            Err(err) => {
                self.close();
                self.shared.record(Err(err))
            }
        }
    }

    fn step(&mut self) -> Result<bool, SqliteDbError> {
        let count = self.column_names.len();
        match self.rows.next()? {
            Some(row) => {
                let mut values = Vec::with_capacity(count);
                for idx in 0..count {
                    values.push(from_value_ref(row.get_ref(idx)?));
                }
                self.current = Some(values);
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    /// Stop iterating. Further calls to `next` return `false`.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.current = None;
            self.shared.result_set_closed(self.generation);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed || !self.shared.is_result_set_live(self.generation)
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Position of a column by name, ignoring case.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_index_cache.get(&name.to_lowercase()).copied()
    }

    fn current_value<C: ColumnIndex>(&self, column: C) -> Result<&SqlValue, SqliteDbError> {
        let idx = column.resolve(&self.column_names, &self.column_index_cache)?;
        let values = self.current.as_ref().ok_or(SqliteDbError::NoCurrentRow)?;
        values
            .get(idx)
            .ok_or(SqliteDbError::ColumnIndexOutOfRange {
                index: idx,
                count: values.len(),
            })
    }

    /// Value of a column in the current row.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::NoCurrentRow`] before the first `next` or after exhaustion, and a
    /// column lookup error for an unknown column.
    pub fn value<C: ColumnIndex>(&self, column: C) -> Result<SqlValue, SqliteDbError> {
        self.current_value(column).cloned()
    }

    /// # Errors
    /// See [`value`](ResultSet::value).
    pub fn is_null<C: ColumnIndex>(&self, column: C) -> Result<bool, SqliteDbError> {
        Ok(self.current_value(column)?.is_null())
    }

    /// Storage class of a column in the current row.
    ///
    /// # Errors
    /// See [`value`](ResultSet::value).
    pub fn column_type<C: ColumnIndex>(&self, column: C) -> Result<ValueType, SqliteDbError> {
        Ok(self.current_value(column)?.value_type())
    }

    /// Column as a 64-bit integer. NULL reads as `0`, REAL is truncated, TEXT is parsed
    /// leniently (`0` when it is not a number).
    ///
    /// # Errors
    /// See [`value`](ResultSet::value).
    pub fn long<C: ColumnIndex>(&self, column: C) -> Result<i64, SqliteDbError> {
        Ok(coerce_long(self.current_value(column)?))
    }

    /// Column as a 32-bit integer.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ExecutionError`] when the value does not fit in an `i32`, or the
    /// lookup errors of [`value`](ResultSet::value).
    pub fn int<C: ColumnIndex>(&self, column: C) -> Result<i32, SqliteDbError> {
        let value = self.long(column)?;
        i32::try_from(value).map_err(|_| {
            SqliteDbError::ExecutionError(format!("value {value} does not fit in a 32-bit integer"))
        })
    }

    /// Column as a boolean: any non-zero integer is `true`.
    ///
    /// # Errors
    /// See [`value`](ResultSet::value).
    pub fn bool<C: ColumnIndex>(&self, column: C) -> Result<bool, SqliteDbError> {
        Ok(coerce_long(self.current_value(column)?) != 0)
    }

    /// Column as a double. NULL reads as `0.0`.
    ///
    /// # Errors
    /// See [`value`](ResultSet::value).
    pub fn double<C: ColumnIndex>(&self, column: C) -> Result<f64, SqliteDbError> {
        Ok(coerce_double(self.current_value(column)?))
    }

    /// Column as text; numbers are rendered, BLOBs are decoded as UTF-8 and NULL is `None`.
    ///
    /// # Errors
    /// See [`value`](ResultSet::value).
    pub fn string<C: ColumnIndex>(&self, column: C) -> Result<Option<String>, SqliteDbError> {
        Ok(coerce_string(self.current_value(column)?))
    }

    /// Column as raw bytes; TEXT yields its UTF-8 bytes and NULL is `None`.
    ///
    /// # Errors
    /// See [`value`](ResultSet::value).
    pub fn data<C: ColumnIndex>(&self, column: C) -> Result<Option<Vec<u8>>, SqliteDbError> {
        Ok(coerce_data(self.current_value(column)?))
    }

    /// Column as a timestamp. TEXT is parsed with the connection's date format when one is set,
    /// numbers are seconds since the Unix epoch.
    ///
    /// # Errors
    /// See [`value`](ResultSet::value).
    pub fn date<C: ColumnIndex>(&self, column: C) -> Result<Option<NaiveDateTime>, SqliteDbError> {
        Ok(coerce_date(
            self.current_value(column)?,
            self.shared.date_format(),
        ))
    }

    /// Owned copy of the current row.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::NoCurrentRow`] when the cursor is not on a row.
    pub fn row(&self) -> Result<Row, SqliteDbError> {
        let values = self.current.clone().ok_or(SqliteDbError::NoCurrentRow)?;
        Ok(Row::with_cache(
            Arc::clone(&self.column_names),
            values,
            Arc::clone(&self.column_index_cache),
        ))
    }

    /// Column name -> value map of the current row.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::NoCurrentRow`] when the cursor is not on a row.
    pub fn result_dictionary(&self) -> Result<HashMap<String, SqlValue>, SqliteDbError> {
        Ok(self.row()?.to_map())
    }

    /// Drain the remaining rows into owned [`Row`]s.
    ///
    /// # Errors
    /// Returns the engine error if stepping fails.
    pub fn collect_rows(&mut self) -> Result<Vec<Row>, SqliteDbError> {
        let mut rows = Vec::new();
        while self.next()? {
            rows.push(self.row()?);
        }
        Ok(rows)
    }
}

impl Drop for ResultSet<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ResultSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("column_names", &self.column_names)
            .field("current", &self.current)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

pub(crate) fn coerce_long(value: &SqlValue) -> i64 {
    match value {
        SqlValue::Int(i) => *i,
        SqlValue::Bool(b) => i64::from(*b),
        #[allow(clippy::cast_possible_truncation)]
        SqlValue::Float(f) => *f as i64,
        SqlValue::Text(s) => match parse_leading_number(s) {
            Some(NumericPrefix::Integer(i)) => i,
            #[allow(clippy::cast_possible_truncation)]
            Some(NumericPrefix::Real(f)) => f as i64,
            None => 0,
        },
        _ => 0,
    }
}

pub(crate) fn coerce_double(value: &SqlValue) -> f64 {
    match value {
        SqlValue::Float(f) => *f,
        #[allow(clippy::cast_precision_loss)]
        SqlValue::Int(i) => *i as f64,
        SqlValue::Bool(b) => f64::from(u8::from(*b)),
        SqlValue::Text(s) => match parse_leading_number(s) {
            #[allow(clippy::cast_precision_loss)]
            Some(NumericPrefix::Integer(i)) => i as f64,
            Some(NumericPrefix::Real(f)) => f,
            None => 0.0,
        },
        _ => 0.0,
    }
}

pub(crate) fn coerce_string(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Text(s) => Some(s.clone()),
        SqlValue::Int(i) => Some(i.to_string()),
        SqlValue::Float(f) => Some(f.to_string()),
        SqlValue::Bool(b) => Some(i64::from(*b).to_string()),
        SqlValue::Blob(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        SqlValue::Json(json) => Some(json.to_string()),
        SqlValue::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
    }
}

pub(crate) fn coerce_data(value: &SqlValue) -> Option<Vec<u8>> {
    match value {
        SqlValue::Null => None,
        SqlValue::Blob(bytes) => Some(bytes.clone()),
        other => coerce_string(other).map(String::into_bytes),
    }
}

pub(crate) fn coerce_date(value: &SqlValue, date_format: Option<&str>) -> Option<NaiveDateTime> {
    match (value, date_format) {
        (SqlValue::Text(s), Some(fmt)) => parse_with_format(s, fmt),
        (SqlValue::Text(s), None) => parse_timestamp_text(s),
        (SqlValue::Int(secs), _) => {
            #[allow(clippy::cast_precision_loss)]
            let secs = *secs as f64;
            timestamp_from_epoch_seconds(secs)
        }
        (SqlValue::Float(secs), _) => timestamp_from_epoch_seconds(*secs),
        (SqlValue::Timestamp(ts), _) => Some(*ts),
        _ => None,
    }
}

pub(crate) fn parse_with_format(s: &str, fmt: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, fmt)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

enum NumericPrefix {
    Integer(i64),
    Real(f64),
}

/// Longest numeric prefix of `s`, the way `SQLite` converts TEXT to a number. Integer prefixes
/// stay exact; fractions and exponents go through `f64`.
fn parse_leading_number(s: &str) -> Option<NumericPrefix> {
    let trimmed = s.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut seen_digit = end > digits_start;
    let mut integral = true;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if seen_digit || frac_end > frac_start {
            seen_digit = true;
            integral = false;
            end = frac_end;
        }
    }
    if !seen_digit {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            integral = false;
            end = exp_end;
        }
    }
    let prefix = &trimmed[..end];
    if integral && let Ok(i) = prefix.parse::<i64>() {
        return Some(NumericPrefix::Integer(i));
    }
    prefix.parse::<f64>().ok().map(NumericPrefix::Real)
}
