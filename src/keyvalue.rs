use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::DatabaseOptions;
use crate::error::SqliteDbError;
use crate::queue::DatabaseQueue;
use crate::types::SqlValue;

/// Collection used by the single-key methods.
pub const DEFAULT_COLLECTION: &str = "default";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    rowid INTEGER PRIMARY KEY,
    collection TEXT NOT NULL,
    key TEXT NOT NULL,
    data BLOB,
    metadata BLOB
);
CREATE UNIQUE INDEX IF NOT EXISTS kv_store_collection_key ON kv_store (collection, key);";

const UPSERT: &str = "INSERT INTO kv_store (collection, key, data, metadata) VALUES (?, ?, ?, ?)
    ON CONFLICT (collection, key) DO UPDATE SET data = excluded.data, metadata = excluded.metadata";

/// How new values are written to the `data` and `metadata` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueFormat {
    /// JSON bytes in a BLOB.
    #[default]
    Json,
    /// JSON text in a TEXT column, readable from the sqlite3 shell.
    JsonText,
}

/// Lightweight key/value storage in the `kv_store` table, grouped into collections.
///
/// Values are any `serde` type. All access goes through a [`DatabaseQueue`], so a store can be
/// cloned and shared freely; give it its own database file rather than sharing one with other
/// writers.
#[derive(Debug, Clone)]
pub struct KeyValueStore {
    queue: DatabaseQueue,
    format: ValueFormat,
}

impl KeyValueStore {
    /// Open the store for `options`, creating the table when missing.
    ///
    /// # Errors
    /// Returns open or schema errors.
    pub async fn open(options: DatabaseOptions) -> Result<Self, SqliteDbError> {
        Self::with_queue(DatabaseQueue::open(options)?).await
    }

    /// Use an existing queue, creating the table when missing.
    ///
    /// # Errors
    /// Returns open or schema errors.
    pub async fn with_queue(queue: DatabaseQueue) -> Result<Self, SqliteDbError> {
        queue
            .in_database(|db| db.execute_statements(CREATE_TABLE))
            .await?;
        Ok(Self {
            queue,
            format: ValueFormat::default(),
        })
    }

    #[must_use]
    pub fn format(&self) -> ValueFormat {
        self.format
    }

    /// Change how values written from now on are stored. Existing rows stay readable.
    pub fn set_format(&mut self, format: ValueFormat) {
        self.format = format;
    }

    #[must_use]
    pub fn queue(&self) -> &DatabaseQueue {
        &self.queue
    }

    /// Store `value` under `key` in the default collection.
    ///
    /// # Errors
    /// Returns serialization or database errors.
    pub async fn set_object<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), SqliteDbError> {
        self.set_object_in(DEFAULT_COLLECTION, key, value, None::<&()>)
            .await
    }

    /// # Errors
    /// Returns database or deserialization errors.
    pub async fn object_for_key<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SqliteDbError> {
        self.object_in(DEFAULT_COLLECTION, key).await
    }

    /// Store `value` (and optional `metadata`) under `collection`/`key`, replacing what was there.
    ///
    /// # Errors
    /// Returns serialization or database errors.
    pub async fn set_object_in<T, M>(
        &self,
        collection: &str,
        key: &str,
        value: &T,
        metadata: Option<&M>,
    ) -> Result<(), SqliteDbError>
    where
        T: Serialize + ?Sized,
        M: Serialize + ?Sized,
    {
        let data = self.encode(value)?;
        let metadata = match metadata {
            Some(meta) => self.encode(meta)?,
            None => SqlValue::Null,
        };
        let params = vec![
            SqlValue::Text(collection.to_owned()),
            SqlValue::Text(key.to_owned()),
            data,
            metadata,
        ];
        self.queue
            .in_database(move |db| db.execute_update(UPSERT, &params))
            .await?;
        Ok(())
    }

    /// # Errors
    /// Returns database or deserialization errors.
    pub async fn object_in<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<T>, SqliteDbError> {
        let raw = self.column_in("data", collection, key).await?;
        raw.map(|value| decode(&value)).transpose()
    }

    /// # Errors
    /// Returns database or deserialization errors.
    pub async fn metadata_in<M: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<M>, SqliteDbError> {
        let raw = self.column_in("metadata", collection, key).await?;
        raw.map(|value| decode(&value)).transpose()
    }

    async fn column_in(
        &self,
        column: &'static str,
        collection: &str,
        key: &str,
    ) -> Result<Option<SqlValue>, SqliteDbError> {
        let params = vec![
            SqlValue::Text(collection.to_owned()),
            SqlValue::Text(key.to_owned()),
        ];
        self.queue
            .in_database(move |db| {
                db.value_for_query(
                    &format!("SELECT {column} FROM kv_store WHERE collection = ? AND key = ?"),
                    &params,
                )
            })
            .await
    }

    /// Remove `key` from the default collection. Returns whether a row was removed.
    ///
    /// # Errors
    /// Returns database errors.
    pub async fn remove(&self, key: &str) -> Result<bool, SqliteDbError> {
        self.remove_in(DEFAULT_COLLECTION, key).await
    }

    /// # Errors
    /// Returns database errors.
    pub async fn remove_in(&self, collection: &str, key: &str) -> Result<bool, SqliteDbError> {
        let params = vec![
            SqlValue::Text(collection.to_owned()),
            SqlValue::Text(key.to_owned()),
        ];
        let removed = self
            .queue
            .in_database(move |db| {
                db.execute_update(
                    "DELETE FROM kv_store WHERE collection = ? AND key = ?",
                    &params,
                )
            })
            .await?;
        Ok(removed > 0)
    }

    /// Remove every key of `collection`, returning how many were removed.
    ///
    /// # Errors
    /// Returns database errors.
    pub async fn remove_all_in(&self, collection: &str) -> Result<usize, SqliteDbError> {
        let params = vec![SqlValue::Text(collection.to_owned())];
        self.queue
            .in_database(move |db| {
                db.execute_update("DELETE FROM kv_store WHERE collection = ?", &params)
            })
            .await
    }

    /// Keys of `collection` in insertion order.
    ///
    /// # Errors
    /// Returns database errors.
    pub async fn keys_in(&self, collection: &str) -> Result<Vec<String>, SqliteDbError> {
        let params = vec![SqlValue::Text(collection.to_owned())];
        self.queue
            .in_database(move |db| {
                db.query(
                    "SELECT key FROM kv_store WHERE collection = ? ORDER BY rowid",
                    &params,
                    |rs| {
                        let mut keys = Vec::new();
                        while rs.next()? {
                            keys.extend(rs.string(0)?);
                        }
                        Ok(keys)
                    },
                )
            })
            .await
    }

    /// # Errors
    /// Returns database errors.
    pub async fn count_in(&self, collection: &str) -> Result<u64, SqliteDbError> {
        let params = vec![SqlValue::Text(collection.to_owned())];
        let count = self
            .queue
            .in_database(move |db| {
                db.long_for_query(
                    "SELECT count(*) FROM kv_store WHERE collection = ?",
                    &params,
                )
            })
            .await?;
        Ok(count.map_or(0, |n| u64::try_from(n).unwrap_or(0)))
    }

    /// Names of every collection holding at least one key.
    ///
    /// # Errors
    /// Returns database errors.
    pub async fn collections(&self) -> Result<Vec<String>, SqliteDbError> {
        self.queue
            .in_database(|db| {
                db.query(
                    "SELECT DISTINCT collection FROM kv_store ORDER BY collection",
                    &[],
                    |rs| {
                        let mut names = Vec::new();
                        while rs.next()? {
                            names.extend(rs.string(0)?);
                        }
                        Ok(names)
                    },
                )
            })
            .await
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<SqlValue, SqliteDbError> {
        Ok(match self.format {
            ValueFormat::Json => SqlValue::Blob(serde_json::to_vec(value)?),
            ValueFormat::JsonText => SqlValue::Text(serde_json::to_string(value)?),
        })
    }
}

fn decode<T: DeserializeOwned>(value: &SqlValue) -> Result<T, SqliteDbError> {
    match value {
        SqlValue::Blob(bytes) => Ok(serde_json::from_slice(bytes)?),
        SqlValue::Text(text) => Ok(serde_json::from_str(text)?),
        other => Err(SqliteDbError::ExecutionError(format!(
            "stored value has unexpected type {:?}",
            other.value_type()
        ))),
    }
}
