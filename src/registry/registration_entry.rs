//! Per-user registration state with its own lock and wake handle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::EventQueue;
use crate::domain::{Domain, Event, EventFilter, ListenEvent, UserId};

/// Everything the registry knows about one connected user.
///
/// The state is guarded by a lock scoped to this entry only, and blocked
/// `listen` calls park on this entry's [`Notify`]. Events for one user
/// therefore never contend with another user's long poll.
#[derive(Debug)]
pub(crate) struct RegistrationEntry {
    user_id: UserId,
    state: Mutex<EntryState>,
    wake: Notify,
    active_listens: AtomicUsize,
}

/// Mutable part of a [`RegistrationEntry`].
#[derive(Debug)]
pub(crate) struct EntryState {
    pub(crate) domains: HashSet<Domain>,
    pub(crate) filters: HashMap<Domain, Arc<dyn EventFilter>>,
    pub(crate) queue: EventQueue,
    pub(crate) last_activity: Instant,
    pub(crate) last_batch: Option<Instant>,
    /// Set once the entry left the registry; parked listens return.
    pub(crate) detached: bool,
}

impl RegistrationEntry {
    pub(crate) fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            state: Mutex::new(EntryState {
                domains: HashSet::new(),
                filters: HashMap::new(),
                queue: EventQueue::new(),
                last_activity: Instant::now(),
                last_batch: None,
                detached: false,
            }),
            wake: Notify::new(),
            active_listens: AtomicUsize::new(0),
        }
    }

    pub(crate) const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, EntryState> {
        self.state.lock().await
    }

    pub(crate) const fn wake_handle(&self) -> &Notify {
        &self.wake
    }

    /// Wakes every listen call parked on this entry.
    pub(crate) fn wake(&self) {
        self.wake.notify_waiters();
    }

    /// Enqueues a domain event if the user is subscribed and the filter
    /// accepts it. Returns `true` if the event was enqueued.
    pub(crate) async fn offer_domain_event(&self, domain: &Domain, event: &Event) -> bool {
        let mut state = self.state.lock().await;
        if state.detached || !state.domains.contains(domain) {
            return false;
        }
        if let Some(filter) = state.filters.get(domain)
            && !filter.accepts(event)
        {
            tracing::trace!(user_id = %self.user_id, %domain, "event rejected by filter");
            return false;
        }
        state.queue.push_domain_event(domain.clone(), event.clone());
        drop(state);
        self.wake();
        true
    }

    /// Enqueues a user-specific event, bypassing domain filters.
    pub(crate) async fn offer_user_event(&self, event: Event) -> bool {
        let mut state = self.state.lock().await;
        if state.detached {
            return false;
        }
        state.queue.push_user_event(event);
        drop(state);
        self.wake();
        true
    }

    /// Marks the start of a listen call and returns the earliest instant
    /// it may return, honouring the minimum wait since the last batch.
    pub(crate) async fn begin_listen(&self, now: Instant, min_wait: Duration) -> Instant {
        let mut state = self.state.lock().await;
        state.last_activity = now;
        state.last_batch.unwrap_or(now) + min_wait
    }

    /// Drains pending events and records the batch time.
    pub(crate) async fn take_batch(&self) -> Vec<ListenEvent> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.last_activity = now;
        state.last_batch = Some(now);
        state.queue.drain()
    }

    /// Returns `true` if there is something for a parked listen to do.
    pub(crate) async fn is_ready(&self) -> bool {
        let state = self.state.lock().await;
        state.detached || !state.queue.is_empty()
    }

    /// Returns `true` if no listen is active and the user has been silent
    /// for longer than `timeout`.
    pub(crate) async fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        if self.active_listens.load(Ordering::Acquire) > 0 {
            return false;
        }
        let state = self.state.lock().await;
        now.saturating_duration_since(state.last_activity) > timeout
    }

    /// Releases buffered events and wakes parked listens after the entry
    /// was removed from the registry.
    pub(crate) async fn detach(&self) {
        let mut state = self.state.lock().await;
        state.detached = true;
        state.domains.clear();
        state.filters.clear();
        let released = state.queue.drain().len();
        drop(state);
        if released > 0 {
            tracing::debug!(user_id = %self.user_id, released, "released buffered events");
        }
        self.wake();
    }

    /// Registers an in-flight listen; the count drops with the guard, also
    /// when the caller's future is cancelled mid-wait.
    pub(crate) fn listen_guard(self: &Arc<Self>) -> ListenGuard {
        self.active_listens.fetch_add(1, Ordering::AcqRel);
        ListenGuard {
            entry: Arc::clone(self),
        }
    }
}

/// Keeps a [`RegistrationEntry`] exempt from eviction while a listen runs.
#[derive(Debug)]
pub(crate) struct ListenGuard {
    entry: Arc<RegistrationEntry>,
}

impl Drop for ListenGuard {
    fn drop(&mut self) {
        self.entry.active_listens.fetch_sub(1, Ordering::AcqRel);
    }
}
