use rusqlite::types::{Value, ValueRef};

use crate::error::SqliteDbError;
use crate::types::{SqlValue, format_timestamp, timestamp_to_epoch_seconds};

/// Convert a single `SqlValue` to a rusqlite `Value`.
///
/// Timestamps are written as text in `date_format` when one is configured on the connection,
/// otherwise as REAL seconds since the Unix epoch.
#[must_use]
pub fn to_sqlite_value(value: &SqlValue, date_format: Option<&str>) -> Value {
    match value {
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Timestamp(dt) => match date_format.and_then(|fmt| format_timestamp(dt, fmt)) {
            Some(text) => Value::Text(text),
            None => Value::Real(timestamp_to_epoch_seconds(dt)),
        },
        SqlValue::Null => Value::Null,
        SqlValue::Json(jval) => Value::Text(jval.to_string()),
        SqlValue::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Convert a borrowed engine value into an owned `SqlValue`.
#[must_use]
pub fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int(i),
        ValueRef::Real(f) => SqlValue::Float(f),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

/// Positional `SQLite` parameter container.
pub struct Params(pub Vec<Value>);

impl Params {
    /// Convert middleware values into `SQLite` values.
    #[must_use]
    pub fn convert(params: &[SqlValue], date_format: Option<&str>) -> Self {
        Params(
            params
                .iter()
                .map(|p| to_sqlite_value(p, date_format))
                .collect(),
        )
    }

    /// Build a borrowed params slice suitable for rusqlite execution.
    #[must_use]
    pub fn as_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.0.iter().map(|v| v as &dyn rusqlite::ToSql).collect()
    }
}

/// Parameters bound by name (`:name`, `@name` or `$name`).
///
/// Keys given without a prefix are bound as `:key`. Insertion order is kept; inserting a name
/// twice replaces the earlier value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedParams {
    entries: Vec<(String, SqlValue)>,
}

impl NamedParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<SqlValue>) {
        let name = normalize_param_name(name);
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        let name = normalize_param_name(name);
        self.entries
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub(crate) fn convert(&self, date_format: Option<&str>) -> Vec<(String, Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.clone(), to_sqlite_value(value, date_format)))
            .collect()
    }
}

impl<K: AsRef<str>, V: Into<SqlValue>> FromIterator<(K, V)> for NamedParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = NamedParams::new();
        for (name, value) in iter {
            params.insert(name.as_ref(), value);
        }
        params
    }
}

fn normalize_param_name(name: &str) -> String {
    if name.starts_with([':', '@', '$']) {
        name.to_owned()
    } else {
        format!(":{name}")
    }
}

/// Borrow converted named values in the shape rusqlite binds by name.
pub(crate) fn named_refs(converted: &[(String, Value)]) -> Vec<(&str, &dyn rusqlite::ToSql)> {
    converted
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn rusqlite::ToSql))
        .collect()
}

/// Reject bindings whose count does not match the statement's parameter count.
pub(crate) fn check_parameter_count(
    expected: usize,
    supplied: usize,
    sql: &str,
) -> Result<(), SqliteDbError> {
    if expected == supplied {
        Ok(())
    } else {
        Err(SqliteDbError::ParameterError(format!(
            "statement expects {expected} parameter(s) but {supplied} were supplied: {sql}"
        )))
    }
}
