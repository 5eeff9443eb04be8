use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteDbError {
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Database is not open")]
    DatabaseClosed,

    #[error("Queue was re-entered from one of its own closures; this would deadlock")]
    ReentrantQueue,

    #[error("Pool delegate refused to add the database")]
    PoolRejected,

    #[error("Statement batch aborted by callback")]
    Aborted,

    #[error("Result set has no current row")]
    NoCurrentRow,

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Column index {index} out of range for {count} columns")]
    ColumnIndexOutOfRange { index: usize, count: usize },
}

impl From<bb8::RunError<SqliteDbError>> for SqliteDbError {
    fn from(err: bb8::RunError<SqliteDbError>) -> Self {
        match err {
            bb8::RunError::User(inner) => inner,
            other => SqliteDbError::ConnectionError(format!("database pool error: {other}")),
        }
    }
}

impl SqliteDbError {
    /// Primary `SQLite` result code carried by this error, if it came from the engine.
    #[must_use]
    pub fn sqlite_code(&self) -> Option<i32> {
        match self {
            SqliteDbError::SqliteError(rusqlite::Error::SqliteFailure(err, _)) => {
                Some(err.extended_code & 0xff)
            }
            _ => None,
        }
    }

    /// Whether the engine reported `SQLITE_BUSY` or `SQLITE_LOCKED`.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SqliteDbError::SqliteError(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    || err.code == rusqlite::ErrorCode::DatabaseLocked
        )
    }
}
