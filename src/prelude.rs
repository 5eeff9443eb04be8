//! Convenient imports for common functionality.
//!
//! ```rust
//! use sqlite_middleware::prelude::*;
//! ```

pub use crate::config::{DatabaseOptions, DatabasePath, JournalMode};
pub use crate::database::{Database, TransactionKind, TxOutcome};
pub use crate::error::SqliteDbError;
pub use crate::keyvalue::{DEFAULT_COLLECTION, KeyValueStore, ValueFormat};
pub use crate::params::NamedParams;
pub use crate::pool::{DatabasePool, PoolConfig, PoolDelegate};
pub use crate::queue::DatabaseQueue;
pub use crate::results::{ResultSet, Row};
pub use crate::statement::{Statement, StatementInfo};
pub use crate::types::{SqlValue, ValueType};
