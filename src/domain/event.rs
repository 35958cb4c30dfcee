//! Event payloads and their delivery envelope.
//!
//! An [`Event`] is an opaque JSON payload. Producers may stamp it with a
//! unique, monotonically increasing id; the registry never looks at it,
//! it only exists so consumers can verify delivery order.
//!
//! A [`ListenEvent`] is what a `listen` call hands back: the event plus the
//! domain it was published to, or no domain for user-specific events.

use serde::{Deserialize, Serialize};

use super::Domain;

/// Opaque event payload with an optional unique id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unique_id: Option<u64>,
    payload: serde_json::Value,
}

impl Event {
    /// Creates an event without a unique id.
    #[must_use]
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            unique_id: None,
            payload,
        }
    }

    /// Creates an event carrying the unique-id capability.
    #[must_use]
    pub fn with_unique_id(unique_id: u64, payload: serde_json::Value) -> Self {
        Self {
            unique_id: Some(unique_id),
            payload,
        }
    }

    /// Returns the unique id, if the event has one.
    #[must_use]
    pub const fn unique_id(&self) -> Option<u64> {
        self.unique_id
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}

/// An event as delivered by `listen`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenEvent {
    /// Domain the event was published to; `None` for user-specific events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
    /// The event itself.
    pub event: Event,
}

impl ListenEvent {
    /// Wraps an event published to `domain`.
    #[must_use]
    pub const fn for_domain(domain: Domain, event: Event) -> Self {
        Self {
            domain: Some(domain),
            event,
        }
    }

    /// Wraps an event addressed to a single user.
    #[must_use]
    pub const fn user_specific(event: Event) -> Self {
        Self {
            domain: None,
            event,
        }
    }

    /// Returns `true` if the event bypassed domain routing.
    #[must_use]
    pub const fn is_user_specific(&self) -> bool {
        self.domain.is_none()
    }
}

/// Returns `true` if the ids of all id-carrying events in `events` are
/// strictly increasing. Events without an id are skipped.
#[must_use]
pub fn is_strictly_ordered<'a>(events: impl IntoIterator<Item = &'a Event>) -> bool {
    let mut last = None;
    for id in events.into_iter().filter_map(Event::unique_id) {
        if last.is_some_and(|prev| prev >= id) {
            return false;
        }
        last = Some(id);
    }
    true
}
