use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use rusqlite::OpenFlags;

use crate::error::SqliteDbError;

/// Where a database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabasePath {
    /// Private in-memory database, discarded on close.
    Memory,
    /// Private on-disk temporary database, deleted on close.
    Temporary,
    /// Regular file (or `file:` URI when the URI flag is set).
    File(PathBuf),
}

impl DatabasePath {
    pub(crate) fn open_arg(&self) -> &Path {
        match self {
            DatabasePath::Memory => Path::new(":memory:"),
            DatabasePath::Temporary => Path::new(""),
            DatabasePath::File(path) => path.as_path(),
        }
    }

    /// File path, if this is a file database.
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        match self {
            DatabasePath::File(path) => Some(path.as_path()),
            _ => None,
        }
    }
}

impl From<PathBuf> for DatabasePath {
    fn from(path: PathBuf) -> Self {
        if path.as_os_str() == ":memory:" {
            DatabasePath::Memory
        } else if path.as_os_str().is_empty() {
            DatabasePath::Temporary
        } else {
            DatabasePath::File(path)
        }
    }
}

impl From<&Path> for DatabasePath {
    fn from(path: &Path) -> Self {
        DatabasePath::from(path.to_path_buf())
    }
}

impl From<&str> for DatabasePath {
    fn from(path: &str) -> Self {
        DatabasePath::from(PathBuf::from(path))
    }
}

impl From<String> for DatabasePath {
    fn from(path: String) -> Self {
        DatabasePath::from(PathBuf::from(path))
    }
}

/// `PRAGMA journal_mode` applied after open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Persist => "PERSIST",
            JournalMode::Memory => "MEMORY",
            JournalMode::Wal => "WAL",
            JournalMode::Off => "OFF",
        }
    }
}

/// Options used every time a [`Database`](crate::Database) is opened.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub path: DatabasePath,
    pub flags: OpenFlags,
    pub vfs: Option<String>,
    pub busy_timeout: Duration,
    pub cache_statements: bool,
    pub statement_cache_capacity: usize,
    pub journal_mode: Option<JournalMode>,
    pub logs_errors: bool,
    pub trace_execution: bool,
    pub date_format: Option<String>,
}

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 64;

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self::new(DatabasePath::Memory)
    }
}

impl DatabaseOptions {
    #[must_use]
    pub fn new(path: impl Into<DatabasePath>) -> Self {
        Self {
            path: path.into(),
            flags: OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            vfs: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            cache_statements: false,
            statement_cache_capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
            journal_mode: None,
            logs_errors: true,
            trace_execution: false,
            date_format: None,
        }
    }

    #[must_use]
    pub fn builder(path: impl Into<DatabasePath>) -> DatabaseOptionsBuilder {
        DatabaseOptionsBuilder::new(path)
    }

    /// Whether the flags ask for a read-only connection.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.flags.contains(OpenFlags::SQLITE_OPEN_READ_ONLY)
    }
}

/// Fluent builder for [`DatabaseOptions`].
#[derive(Debug, Clone)]
pub struct DatabaseOptionsBuilder {
    opts: DatabaseOptions,
}

impl DatabaseOptionsBuilder {
    #[must_use]
    pub fn new(path: impl Into<DatabasePath>) -> Self {
        Self {
            opts: DatabaseOptions::new(path),
        }
    }

    #[must_use]
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.opts.flags = flags;
        self
    }

    /// Open read-only; the database must already exist.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.opts.flags.remove(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE);
        self.opts.flags.insert(OpenFlags::SQLITE_OPEN_READ_ONLY);
        self
    }

    #[must_use]
    pub fn vfs(mut self, vfs: impl Into<String>) -> Self {
        self.opts.vfs = Some(vfs.into());
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.opts.busy_timeout = timeout;
        self
    }

    #[must_use]
    pub fn cache_statements(mut self, cache: bool) -> Self {
        self.opts.cache_statements = cache;
        self
    }

    #[must_use]
    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.opts.statement_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.opts.journal_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn logs_errors(mut self, logs: bool) -> Self {
        self.opts.logs_errors = logs;
        self
    }

    #[must_use]
    pub fn trace_execution(mut self, trace: bool) -> Self {
        self.opts.trace_execution = trace;
        self
    }

    #[must_use]
    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.opts.date_format = Some(format.into());
        self
    }

    /// Validate and return the options.
    ///
    /// # Errors
    /// Returns [`SqliteDbError::ConfigError`] when the flags are contradictory or the cache
    /// capacity is zero while caching is requested.
    pub fn finish(self) -> Result<DatabaseOptions, SqliteDbError> {
        let opts = self.opts;
        if opts.flags.contains(OpenFlags::SQLITE_OPEN_READ_ONLY)
            && opts.flags.contains(OpenFlags::SQLITE_OPEN_READ_WRITE)
        {
            return Err(SqliteDbError::ConfigError(
                "read-only and read-write flags are mutually exclusive".into(),
            ));
        }
        if opts.cache_statements && opts.statement_cache_capacity == 0 {
            return Err(SqliteDbError::ConfigError(
                "statement caching needs a non-zero cache capacity".into(),
            ));
        }
        if matches!(opts.vfs.as_deref(), Some("")) {
            return Err(SqliteDbError::ConfigError("vfs name must not be empty".into()));
        }
        Ok(opts)
    }
}
