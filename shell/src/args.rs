use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sqlite_middleware::JournalMode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Command-line access to sqlite-middleware databases")]
pub(crate) struct Args {
    /// Also write log output to this file.
    #[arg(long, global = true)]
    pub(crate) log: Option<PathBuf>,
    /// Journal mode applied when the database is opened.
    #[arg(long, value_enum, global = true)]
    pub(crate) journal_mode: Option<JournalMode>,
    /// How long to retry while the database is locked.
    #[arg(long, default_value_t = 2000, global = true)]
    pub(crate) busy_timeout_ms: u64,
    /// Log every statement at TRACE level.
    #[arg(long, global = true)]
    pub(crate) trace: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Run one or more statements.
    Exec { db: PathBuf, sql: String },
    /// Run a query and print each row as a JSON object.
    Query { db: PathBuf, sql: String },
    /// Print the schema objects of the database.
    Schema { db: PathBuf },
    /// Print the JSON value stored under a key.
    KvGet {
        db: PathBuf,
        key: String,
        #[arg(long, default_value = sqlite_middleware::keyvalue::DEFAULT_COLLECTION)]
        collection: String,
    },
    /// Store a JSON value under a key.
    KvSet {
        db: PathBuf,
        key: String,
        json: String,
        #[arg(long, default_value = sqlite_middleware::keyvalue::DEFAULT_COLLECTION)]
        collection: String,
        /// Store the value as JSON text rather than bytes.
        #[arg(long)]
        text: bool,
    },
}
