use std::any::Any;
use std::sync::mpsc::SyncSender;

use tokio::sync::oneshot;

use crate::database::Database;
use crate::error::SqliteDbError;

pub(super) type BoxedResponse = Result<Box<dyn Any + Send>, SqliteDbError>;
pub(super) type BoxedCallback = Box<dyn FnOnce(&mut Database) -> BoxedResponse + Send>;

/// Where the worker sends a command's result: an async waiter or a blocked thread.
pub(super) enum Reply<T> {
    Async(oneshot::Sender<T>),
    Blocking(SyncSender<T>),
}

impl<T> Reply<T> {
    pub(super) fn send(self, value: T) {
        // The caller may have given up waiting; nothing to do then.
        let _ = match self {
            Reply::Async(tx) => tx.send(value).map_err(drop),
            Reply::Blocking(tx) => tx.send(value).map_err(drop),
        };
    }
}

pub(super) enum Command {
    Run {
        callback: BoxedCallback,
        respond_to: Reply<BoxedResponse>,
    },
    Close {
        respond_to: Reply<Result<(), SqliteDbError>>,
    },
    Shutdown,
}
