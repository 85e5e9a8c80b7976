//! In-process domain events: the event contract, envelopes, pub/sub bus and
//! async handler seam, plus the per-key lock used to serialize work.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod keyed_lock;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::EventHandler;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use keyed_lock::{KeyedGuard, KeyedLocks};
