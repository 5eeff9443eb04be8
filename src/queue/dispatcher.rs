use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Receiver;

use crate::config::DatabaseOptions;
use crate::database::Database;
use crate::error::SqliteDbError;

use super::channel::{BoxedCallback, BoxedResponse, Command};
use super::worker::SharedInterrupt;

pub(super) fn run_queue_worker(
    options: DatabaseOptions,
    receiver: &Receiver<Command>,
    interrupt: &SharedInterrupt,
) {
    let mut db = Database::new(options);

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Shutdown => break,
            Command::Run {
                callback,
                respond_to,
            } => {
                let response =
                    ensure_open(&mut db, interrupt).and_then(|()| run_callback(&mut db, callback));
                respond_to.send(response);
            }
            Command::Close { respond_to } => {
                let result = db.close();
                if result.is_ok() {
                    interrupt.set(None);
                }
                respond_to.send(result);
            }
        }
    }

    interrupt.set(None);
    if let Err(err) = db.close() {
        tracing::warn!(error = %err, "failed to close queue database on shutdown");
    }
    tracing::debug!("sqlite queue worker stopped");
}

fn ensure_open(db: &mut Database, interrupt: &SharedInterrupt) -> Result<(), SqliteDbError> {
    if db.is_open() {
        return Ok(());
    }
    db.open()?;
    interrupt.set(db.interrupt_handle());
    Ok(())
}

fn run_callback(db: &mut Database, callback: BoxedCallback) -> BoxedResponse {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(db))) {
        Ok(response) => response,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            tracing::warn!(%message, "queue closure panicked");
            if db.in_transaction() {
                if let Err(err) = db.rollback() {
                    tracing::warn!(error = %err, "rollback after panicked closure failed");
                }
            }
            Err(SqliteDbError::ExecutionError(format!(
                "queue closure panicked: {message}"
            )))
        }
    }
}
