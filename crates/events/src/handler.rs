use async_trait::async_trait;

use crate::Event;

/// Consumes one event.
///
/// Handlers run detached from the emitter: an error returned here is the
/// handler's to report (log, metric) and never reaches the code that
/// published the event.
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    async fn handle(&self, event: E) -> Result<(), Self::Error>;
}
