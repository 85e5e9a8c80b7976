use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use hotelpos_events::{Event, EventBus, EventEnvelope, EventHandler, Subscription};

use super::WorkerHandle;

/// Drains a bus subscription into an [`EventHandler`].
///
/// - Every envelope is handled on its own task, so a slow recomputation never
///   delays delivery of the next event.
/// - Handler failures are logged at `error` and dropped: no retry, nothing
///   propagates back to the emitter.
/// - On shutdown the worker stops reading and waits for in-flight handlers.
#[derive(Debug)]
pub struct ListenerWorker;

impl ListenerWorker {
    pub fn spawn<E, B, H>(name: &'static str, bus: &B, handler: Arc<H>) -> WorkerHandle
    where
        E: Event,
        B: EventBus<EventEnvelope<E>>,
        H: EventHandler<E> + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let sub = bus.subscribe();
        let join = tokio::spawn(worker_loop(name, sub, shutdown_rx, handler));
        WorkerHandle::new(name, shutdown_tx, join)
    }
}

async fn worker_loop<E, H>(
    name: &'static str,
    mut sub: Subscription<EventEnvelope<E>>,
    mut shutdown_rx: oneshot::Receiver<()>,
    handler: Arc<H>,
) where
    E: Event,
    H: EventHandler<E> + 'static,
{
    let mut in_flight = JoinSet::new();
    info!(worker = name, "listener worker started");

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            next = sub.recv() => match next {
                Some(envelope) => {
                    let handler = handler.clone();
                    in_flight.spawn(handle_one(name, handler, envelope));
                }
                None => break,
            },
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(err) = joined {
                    error!(worker = name, error = %err, "event handler task panicked");
                }
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(err) = joined {
            error!(worker = name, error = %err, "event handler task panicked");
        }
    }
    info!(worker = name, "listener worker stopped");
}

async fn handle_one<E, H>(name: &'static str, handler: Arc<H>, envelope: EventEnvelope<E>)
where
    E: Event,
    H: EventHandler<E>,
{
    let event_id = envelope.event_id();
    let event_type = envelope.event_type().to_string();
    debug!(worker = name, %event_id, %event_type, "handling event");

    if let Err(err) = handler.handle(envelope.into_payload()).await {
        error!(
            worker = name,
            %event_id,
            %event_type,
            error = %err,
            "event handler failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use hotelpos_events::InMemoryEventBus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Tick {
        fail: bool,
        at: DateTime<Utc>,
    }

    impl Event for Tick {
        fn event_type(&self) -> &'static str {
            "test.tick"
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[derive(Default)]
    struct Counter {
        ok: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler<Tick> for Counter {
        type Error = String;

        async fn handle(&self, event: Tick) -> Result<(), String> {
            if event.fail {
                return Err("boom".into());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.ok.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn handler_failures_do_not_stop_the_worker() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(Counter::default());
        let worker = ListenerWorker::spawn("test", &bus, counter.clone());

        for fail in [false, true, false, false] {
            bus.publish(EventEnvelope::wrap(Tick { fail, at: Utc::now() })).unwrap();
        }

        // Let the loop pick everything up before asking it to stop.
        for _ in 0..100 {
            if counter.ok.load(Ordering::SeqCst) == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        worker.shutdown().await;

        assert_eq!(counter.ok.load(Ordering::SeqCst), 3);
    }
}
