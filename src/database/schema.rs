use crate::error::SqliteDbError;
use crate::results::Row;
use crate::types::SqlValue;

use super::Database;

impl Database {
    /// Whether a table called `name` exists in the main schema, ignoring case.
    ///
    /// # Errors
    /// Returns the engine error if the lookup fails.
    pub fn table_exists(&self, name: &str) -> Result<bool, SqliteDbError> {
        let found = self.long_for_query(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND lower(name) = ?",
            &[SqlValue::Text(name.to_lowercase())],
        )?;
        Ok(found.unwrap_or(0) > 0)
    }

    /// Every user object of the main and temp schemas, with columns `type`, `name`,
    /// `tbl_name`, `rootpage` and `sql`.
    ///
    /// # Errors
    /// Returns the engine error if the lookup fails.
    pub fn schema(&self) -> Result<Vec<Row>, SqliteDbError> {
        self.query_rows(
            "SELECT type, name, tbl_name, rootpage, sql FROM \
             (SELECT * FROM sqlite_master UNION ALL SELECT * FROM sqlite_temp_master) \
             WHERE type != 'meta' AND name NOT LIKE 'sqlite_%' ORDER BY tbl_name, type DESC, name",
            &[],
        )
    }

    /// Output of `PRAGMA table_info` for `table`: one row per column with `cid`, `name`,
    /// `type`, `notnull`, `dflt_value` and `pk`.
    ///
    /// # Errors
    /// Returns the engine error if the pragma fails.
    pub fn table_schema(&self, table: &str) -> Result<Vec<Row>, SqliteDbError> {
        self.query_rows(
            &format!("PRAGMA table_info('{}')", table.replace('\'', "''")),
            &[],
        )
    }

    /// Whether `table` has a column called `column`, ignoring case.
    ///
    /// # Errors
    /// Returns the engine error if the pragma fails.
    pub fn column_exists(&self, column: &str, table: &str) -> Result<bool, SqliteDbError> {
        let wanted = column.to_lowercase();
        Ok(self.table_schema(table)?.iter().any(|row| {
            row.get("name")
                .and_then(SqlValue::as_text)
                .is_some_and(|name| name.to_lowercase() == wanted)
        }))
    }

    /// Check that `sql` compiles, without running it.
    ///
    /// # Errors
    /// Returns the engine's error for invalid SQL.
    pub fn validate_sql(&self, sql: &str) -> Result<(), SqliteDbError> {
        let conn = self.connection()?;
        let result = conn.prepare(sql).map(drop).map_err(SqliteDbError::from);
        self.shared.record(result)
    }

    /// The `application_id` header field.
    ///
    /// # Errors
    /// Returns the engine error if the pragma fails.
    pub fn application_id(&self) -> Result<u32, SqliteDbError> {
        let raw: i32 = self.pragma_value("application_id")?;
        Ok(u32::from_ne_bytes(raw.to_ne_bytes()))
    }

    /// # Errors
    /// Returns the engine error if the pragma fails.
    pub fn set_application_id(&self, id: u32) -> Result<(), SqliteDbError> {
        let raw = i32::from_ne_bytes(id.to_ne_bytes());
        self.pragma_set("application_id", raw)
    }

    /// The `application_id` read as a four character code, e.g. `"ABCD"`.
    ///
    /// # Errors
    /// Returns the engine error if the pragma fails.
    pub fn application_id_string(&self) -> Result<String, SqliteDbError> {
        let bytes = self.application_id()?.to_be_bytes();
        Ok(bytes
            .iter()
            .filter(|b| **b != 0)
            .map(|b| char::from(*b))
            .collect())
    }

    /// Store up to four ASCII characters as the `application_id`.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ParameterError`] for longer or non-ASCII codes, or the engine
    /// error if the pragma fails.
    pub fn set_application_id_string(&self, code: &str) -> Result<(), SqliteDbError> {
        if code.len() > 4 || !code.is_ascii() {
            return self.shared.record(Err(SqliteDbError::ParameterError(format!(
                "application id '{code}' must be at most four ASCII characters"
            ))));
        }
        let mut bytes = [0u8; 4];
        bytes[..code.len()].copy_from_slice(code.as_bytes());
        self.set_application_id(u32::from_be_bytes(bytes))
    }

    /// # Errors
    /// Returns the engine error if the pragma fails.
    pub fn user_version(&self) -> Result<u32, SqliteDbError> {
        let raw: i32 = self.pragma_value("user_version")?;
        Ok(u32::from_ne_bytes(raw.to_ne_bytes()))
    }

    /// # Errors
    /// Returns the engine error if the pragma fails.
    pub fn set_user_version(&self, version: u32) -> Result<(), SqliteDbError> {
        let raw = i32::from_ne_bytes(version.to_ne_bytes());
        self.pragma_set("user_version", raw)
    }

    fn pragma_value(&self, pragma: &str) -> Result<i32, SqliteDbError> {
        let conn = self.connection()?;
        let result = conn
            .pragma_query_value(None, pragma, |row| row.get::<_, i32>(0))
            .map_err(SqliteDbError::from);
        self.shared.record(result)
    }

    fn pragma_set(&self, pragma: &str, value: i32) -> Result<(), SqliteDbError> {
        let conn = self.connection()?;
        let result = conn
            .pragma_update(None, pragma, value)
            .map_err(SqliteDbError::from);
        self.shared.record(result)
    }
}
