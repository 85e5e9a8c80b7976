//! Background tasks: the ledger listener worker and the scheduled valuation.

pub mod listener_worker;
pub mod valuation_job;

pub use listener_worker::ListenerWorker;
pub use valuation_job::ValuationJob;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn new(name: &'static str, shutdown: oneshot::Sender<()>, join: JoinHandle<()>) -> Self {
        Self {
            name,
            shutdown: Some(shutdown),
            join: Some(join),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                warn!(worker = self.name, error = %err, "worker task ended abnormally");
            }
        }
    }
}
