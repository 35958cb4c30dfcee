//! Ordered buffer of pending events for one recipient.

use std::collections::VecDeque;

use crate::domain::{Domain, Event, ListenEvent};

/// Pending events for one recipient, oldest first.
///
/// Domain events and user-specific events share one queue, so draining it
/// yields the merged stream in enqueue order while per-domain and per-user
/// order are preserved.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<ListenEvent>,
}

impl EventQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event published to `domain`.
    pub fn push_domain_event(&mut self, domain: Domain, event: Event) {
        self.events.push_back(ListenEvent::for_domain(domain, event));
    }

    /// Appends a user-specific event.
    pub fn push_user_event(&mut self, event: Event) {
        self.events.push_back(ListenEvent::user_specific(event));
    }

    /// Removes and returns all pending events, oldest first.
    pub fn drain(&mut self) -> Vec<ListenEvent> {
        self.events.drain(..).collect()
    }

    /// Drops pending events of `domain`, returning how many were dropped.
    pub fn discard_domain(&mut self, domain: &Domain) -> usize {
        let before = self.events.len();
        self.events
            .retain(|pending| pending.domain.as_ref() != Some(domain));
        before - self.events.len()
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
