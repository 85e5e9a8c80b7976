use chrono::{DateTime, Utc};

/// A domain event.
///
/// Events are immutable facts. `event_type` is the stable name subscribers
/// and logs refer to (e.g. "detail.created").
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name.
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32 {
        1
    }

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
