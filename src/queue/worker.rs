use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use rusqlite::InterruptHandle;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::config::DatabaseOptions;
use crate::database::Database;
use crate::error::SqliteDbError;

use super::channel::{BoxedCallback, BoxedResponse, Command, Reply};
use super::dispatcher::run_queue_worker;

static QUEUE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Interrupt handle of the worker's open connection, reachable from any thread.
#[derive(Clone, Default)]
pub(super) struct SharedInterrupt(Arc<Mutex<Option<InterruptHandle>>>);

impl SharedInterrupt {
    fn lock(&self) -> MutexGuard<'_, Option<InterruptHandle>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(super) fn set(&self, handle: Option<InterruptHandle>) {
        *self.lock() = handle;
    }

    pub(super) fn interrupt(&self) -> bool {
        match self.lock().as_ref() {
            Some(handle) => {
                handle.interrupt();
                true
            }
            None => false,
        }
    }
}

pub(super) struct QueueWorker {
    sender: Sender<Command>,
    thread_id: ThreadId,
    interrupt: SharedInterrupt,
    options: DatabaseOptions,
}

impl QueueWorker {
    pub(super) fn spawn(options: DatabaseOptions) -> Result<Self, SqliteDbError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let interrupt = SharedInterrupt::default();
        let worker_interrupt = interrupt.clone();
        let worker_options = options.clone();
        let handle = Handle::try_current().ok();
        let queue_id = QUEUE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let join = thread::Builder::new()
            .name(format!("sqlite-queue-{queue_id}"))
            .spawn(move || {
                let runtime_guard = handle.as_ref().map(Handle::enter);
                run_queue_worker(worker_options, &receiver, &worker_interrupt);
                drop(runtime_guard);
            })
            .map_err(|err| {
                SqliteDbError::ConnectionError(format!("failed to spawn queue worker thread: {err}"))
            })?;
        tracing::debug!(queue_id, path = ?options.path, "sqlite queue worker started");

        Ok(Self {
            sender,
            thread_id: join.thread().id(),
            interrupt,
            options,
        })
    }

    pub(super) fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    pub(super) fn interrupt(&self) -> bool {
        self.interrupt.interrupt()
    }

    fn check_reentrancy(&self) -> Result<(), SqliteDbError> {
        if thread::current().id() == self.thread_id {
            Err(SqliteDbError::ReentrantQueue)
        } else {
            Ok(())
        }
    }

    fn send_command(&self, command: Command) -> Result<(), SqliteDbError> {
        self.sender
            .send(command)
            .map_err(|_| connection_error("sqlite queue worker stopped"))
    }

    pub(super) async fn run<F, R>(&self, func: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<R, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.check_reentrancy()?;
        let (tx, rx) = oneshot::channel();
        self.send_command(Command::Run {
            callback: box_callback(func),
            respond_to: Reply::Async(tx),
        })?;
        match rx.await {
            Ok(response) => downcast(response),
            Err(_) => Err(connection_error(
                "sqlite queue worker dropped while running closure",
            )),
        }
    }

    pub(super) fn run_blocking<F, R>(&self, func: F) -> Result<R, SqliteDbError>
    where
        F: FnOnce(&mut Database) -> Result<R, SqliteDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.check_reentrancy()?;
        let (tx, rx) = mpsc::sync_channel(1);
        self.send_command(Command::Run {
            callback: box_callback(func),
            respond_to: Reply::Blocking(tx),
        })?;
        match rx.recv() {
            Ok(response) => downcast(response),
            Err(_) => Err(connection_error(
                "sqlite queue worker dropped while running closure",
            )),
        }
    }

    pub(super) async fn close(&self) -> Result<(), SqliteDbError> {
        self.check_reentrancy()?;
        let (tx, rx) = oneshot::channel();
        self.send_command(Command::Close {
            respond_to: Reply::Async(tx),
        })?;
        rx.await
            .map_err(|_| connection_error("sqlite queue worker dropped while closing"))?
    }

    pub(super) fn close_blocking(&self) -> Result<(), SqliteDbError> {
        self.check_reentrancy()?;
        let (tx, rx) = mpsc::sync_channel(1);
        self.send_command(Command::Close {
            respond_to: Reply::Blocking(tx),
        })?;
        rx.recv()
            .map_err(|_| connection_error("sqlite queue worker dropped while closing"))?
    }
}

impl Drop for QueueWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

fn box_callback<F, R>(func: F) -> BoxedCallback
where
    F: FnOnce(&mut Database) -> Result<R, SqliteDbError> + Send + 'static,
    R: Send + 'static,
{
    Box::new(move |db| func(db).map(|value| Box::new(value) as Box<dyn Any + Send>))
}

fn downcast<R: 'static>(response: BoxedResponse) -> Result<R, SqliteDbError> {
    response?
        .downcast::<R>()
        .map(|boxed| *boxed)
        .map_err(|_| SqliteDbError::ExecutionError("queue response downcast failure".into()))
}

fn connection_error(message: &str) -> SqliteDbError {
    SqliteDbError::ConnectionError(message.into())
}
