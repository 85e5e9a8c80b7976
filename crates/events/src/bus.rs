//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is fire-and-forget pub/sub inside one process:
//!
//! - **Broadcast**: every subscription receives its own copy of each message.
//! - **Non-blocking publish**: `publish` never waits for consumers.
//! - **No persistence**: a message published while no one is subscribed, or
//!   lost in a crash before a consumer handled it, is gone. Consumers must be
//!   able to self-heal (e.g. by full recomputation) from missed messages.

use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};

/// A subscription to a bus.
///
/// Designed for a single consumer task; fan out further inside the consumer
/// if needed.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: UnboundedReceiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: UnboundedReceiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message. `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Take a message if one is already queued.
    pub fn try_recv(&mut self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Domain-agnostic event bus.
///
/// `publish` failures are surfaced to the emitter, but a successful publish
/// says nothing about whether any consumer handled the message.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
