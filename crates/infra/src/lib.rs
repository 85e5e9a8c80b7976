//! Infrastructure layer: configuration, Postgres adapters, the ledger
//! listener and the background workers that drive it.

pub mod config;
pub mod error;
pub mod listener;
pub mod postgres;
pub mod workers;


pub use config::AppConfig;
pub use error::InfraError;
pub use listener::LedgerListener;
pub use workers::{ListenerWorker, ValuationJob, WorkerHandle};
