use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::Event;

/// Envelope for a published event.
///
/// This is the unit carried by the bus. `published_at` is the wall-clock
/// time of emission and may differ from the payload's business time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,
    published_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        event_type: impl Into<String>,
        published_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            published_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event with a fresh id and the current time.
    pub fn wrap(payload: E) -> Self {
        Self::new(Uuid::now_v7(), payload.event_type(), Utc::now(), payload)
    }
}

impl<E: Serialize> EventEnvelope<E> {
    /// Encode the payload as JSON (logging, outbox adapters).
    pub fn payload_json(&self) -> serde_json::Result<JsonValue> {
        serde_json::to_value(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    struct Ping {
        at: DateTime<Utc>,
    }

    impl Event for Ping {
        fn event_type(&self) -> &'static str {
            "test.ping"
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn wrap_copies_event_type() {
        let env = EventEnvelope::wrap(Ping { at: Utc::now() });
        assert_eq!(env.event_type(), "test.ping");
        assert!(env.payload_json().unwrap().get("at").is_some());
    }
}
