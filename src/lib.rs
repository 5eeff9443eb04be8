//! Convenience wrappers around `rusqlite`.
//!
//! - [`Database`]: one connection with an optional statement cache, lazy result sets,
//!   transaction and savepoint helpers, schema introspection and error bookkeeping.
//! - [`DatabaseQueue`]: a worker thread that owns one `Database` and runs submitted closures
//!   in order, the safe way to share a database across threads and tasks.
//! - [`DatabasePool`]: a bb8 pool of `Database` connections for concurrent readers.
//! - [`KeyValueStore`]: a small `serde` key/value store kept in a table.
//!
//! ```rust
//! use sqlite_middleware::prelude::*;
//!
//! # fn main() -> Result<(), SqliteDbError> {
//! let db = Database::open_in_memory()?;
//! db.execute_statements("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//! db.execute_update("INSERT INTO users (name) VALUES (?)", &[SqlValue::from("alice")])?;
//!
//! let names = db.query("SELECT name FROM users ORDER BY id", &[], |rs| {
//!     let mut names = Vec::new();
//!     while rs.next()? {
//!         names.extend(rs.string("name")?);
//!     }
//!     Ok(names)
//! })?;
//! assert_eq!(names, vec!["alice".to_owned()]);
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub mod config;
pub mod database;
pub mod error;
pub mod keyvalue;
pub mod params;
pub mod pool;
pub mod queue;
pub mod results;
pub mod statement;
pub mod types;

pub use config::{DatabaseOptions, DatabaseOptionsBuilder, DatabasePath, JournalMode};
pub use database::{Database, LastError, RowDictionary, TransactionKind, TxOutcome};
pub use error::SqliteDbError;
pub use keyvalue::{KeyValueStore, ValueFormat};
pub use params::NamedParams;
pub use pool::{DatabasePool, PoolConfig, PoolDelegate};
pub use queue::DatabaseQueue;
pub use results::{ResultSet, Row};
pub use statement::{Statement, StatementInfo};
pub use types::{SqlValue, ValueType};

pub use rusqlite;
