//! Worker lifecycle supervision
//!
//! Every worker runs in its own task. A small watcher task awaits the
//! worker's `JoinHandle` and tells the coordinator how it ended, so a
//! worker that errors or panics is reclaimed just like one that exits
//! cleanly.

use std::future::Future;

use tokio::sync::OwnedSemaphorePermit;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

use crate::coordinator::CoordinatorHandle;
use crate::error::AppError;
use crate::types::ClientId;

/// How a worker task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Connection closed normally
    Clean,
    /// The worker returned an error
    Failed(String),
    /// The worker panicked or was cancelled
    Panicked,
}

impl WorkerExit {
    fn from_join(result: Result<Result<(), AppError>, JoinError>) -> Self {
        match result {
            Ok(Ok(())) => WorkerExit::Clean,
            Ok(Err(e)) => WorkerExit::Failed(e.to_string()),
            Err(_) => WorkerExit::Panicked,
        }
    }
}

/// Spawns workers and reports their termination
#[derive(Debug, Clone)]
pub struct Supervisor {
    coordinator: CoordinatorHandle,
}

impl Supervisor {
    pub fn new(coordinator: CoordinatorHandle) -> Self {
        Self { coordinator }
    }

    /// Run `worker` for `client_id` and report its exit
    ///
    /// `permit` is the client's connection slot; it is released only after
    /// the worker has finished. Returns the watcher's handle.
    pub fn spawn<F>(
        &self,
        client_id: ClientId,
        permit: Option<OwnedSemaphorePermit>,
        worker: F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let task = tokio::spawn(worker);
        let coordinator = self.coordinator.clone();

        tokio::spawn(async move {
            let exit = WorkerExit::from_join(task.await);
            drop(permit);

            if coordinator.report_exit(client_id, exit).await.is_err() {
                debug!("Coordinator gone, exit of {} not reported", client_id);
            }
        })
    }
}
