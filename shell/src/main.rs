mod args;
mod commands;
mod logging;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use sqlite_middleware::DatabaseOptions;
use tracing_subscriber::EnvFilter;

use crate::args::Args;
use crate::logging::LogWriter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    let writer = match LogWriter::new(args.log.clone()) {
        Ok(writer) => writer,
        Err(err) => {
            eprintln!("failed to open log file: {err}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let configure = |db: &std::path::Path| -> DatabaseOptions {
        let mut builder = DatabaseOptions::builder(db)
            .busy_timeout(Duration::from_millis(args.busy_timeout_ms))
            .trace_execution(args.trace);
        if let Some(mode) = args.journal_mode {
            builder = builder.journal_mode(mode);
        }
        match builder.finish() {
            Ok(options) => options,
            Err(err) => {
                tracing::warn!(error = %err, "invalid options, using defaults");
                DatabaseOptions::new(db)
            }
        }
    };

    match commands::run(args.command, configure).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
