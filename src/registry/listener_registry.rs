//! Listener registry: subscriptions, buffering, blocking listen, eviction.
//!
//! [`ListenerRegistry`] keeps one [`RegistrationEntry`] per user in a map
//! guarded by a [`tokio::sync::RwLock`], plus a reverse index from domain
//! to subscribed users used for fan-out. Each entry has its own lock and
//! wake handle, so the outer lock is never held while a listen waits.
//!
//! # Lock order
//!
//! Outer index lock first, entry lock second. Nothing takes the index lock
//! while holding an entry lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::Instant;

use super::registration_entry::RegistrationEntry;
use crate::config::WaitingTimes;
use crate::domain::{Domain, Event, EventFilter, ListenEvent, UserId};
use crate::error::EventServiceError;

/// Central registry of connected users and their subscriptions.
///
/// Owned by whatever hosts the transport endpoint and shared behind an
/// `Arc`. Tests get a fresh registry by constructing a new one.
///
/// # Concurrency
///
/// - Any number of `listen` calls may be parked at once, each on its own
///   entry.
/// - `add_event` / `add_event_user_specific` may run from any task while
///   listens are parked.
/// - Registration changes and the eviction sweep take the outer write lock
///   briefly and never wait for a listen.
#[derive(Debug)]
pub struct ListenerRegistry {
    waiting_times: WaitingTimes,
    index: RwLock<RegistryIndex>,
}

#[derive(Debug, Default)]
struct RegistryIndex {
    entries: HashMap<UserId, Arc<RegistrationEntry>>,
    subscribers: HashMap<Domain, HashSet<UserId>>,
}

impl RegistryIndex {
    fn unsubscribe(&mut self, domain: &Domain, user_id: &UserId) {
        if let Some(users) = self.subscribers.get_mut(domain) {
            users.remove(user_id);
            if users.is_empty() {
                self.subscribers.remove(domain);
            }
        }
    }
}

impl ListenerRegistry {
    /// Creates an empty registry with the given listen timing.
    #[must_use]
    pub fn new(waiting_times: WaitingTimes) -> Self {
        tracing::info!("configuration changed - EventServiceConfiguration. {waiting_times}");
        Self {
            waiting_times,
            index: RwLock::new(RegistryIndex::default()),
        }
    }

    /// Returns the listen timing this registry was built with.
    #[must_use]
    pub const fn configuration(&self) -> &WaitingTimes {
        &self.waiting_times
    }

    /// Subscribes `user_id` to `domain`, creating the user's registration
    /// on first use. Registering an existing subscription again only
    /// replaces the filter, and only if one is given.
    pub async fn register_listener(
        &self,
        user_id: &UserId,
        domain: &Domain,
        filter: Option<Arc<dyn EventFilter>>,
    ) {
        let mut index = self.index.write().await;
        let entry = if let Some(existing) = index.entries.get(user_id) {
            Arc::clone(existing)
        } else {
            let created = Arc::new(RegistrationEntry::new(user_id.clone()));
            index
                .entries
                .insert(user_id.clone(), Arc::clone(&created));
            tracing::info!(%user_id, "user registered");
            created
        };
        index
            .subscribers
            .entry(domain.clone())
            .or_default()
            .insert(user_id.clone());

        let mut state = entry.lock().await;
        let added = state.domains.insert(domain.clone());
        if let Some(filter) = filter {
            state.filters.insert(domain.clone(), filter);
        }
        state.last_activity = Instant::now();
        if added {
            tracing::debug!(%user_id, %domain, "listener registered");
        }
    }

    /// Unsubscribes `user_id` from `domain`.
    pub async fn unregister_listener(&self, user_id: &UserId, domain: &Domain) {
        self.unregister(user_id, Some(std::slice::from_ref(domain)))
            .await;
    }

    /// Unsubscribes `user_id` from every domain in `domains`.
    pub async fn unregister_listener_domains(&self, user_id: &UserId, domains: &[Domain]) {
        self.unregister(user_id, Some(domains)).await;
    }

    /// Unsubscribes `user_id` from all domains and drops the registration.
    pub async fn unregister_listeners(&self, user_id: &UserId) {
        self.unregister(user_id, None).await;
    }

    async fn unregister(&self, user_id: &UserId, domains: Option<&[Domain]>) {
        let mut index = self.index.write().await;
        let Some(entry) = index.entries.get(user_id).map(Arc::clone) else {
            tracing::debug!(%user_id, "unregister for unknown user ignored");
            return;
        };

        let (removed, now_empty) = {
            let mut state = entry.lock().await;
            let removed: Vec<Domain> = match domains {
                Some(requested) => requested
                    .iter()
                    .filter(|domain| state.domains.remove(*domain))
                    .cloned()
                    .collect(),
                None => state.domains.drain().collect(),
            };
            for domain in &removed {
                state.queue.discard_domain(domain);
            }
            state.last_activity = Instant::now();
            (removed, state.domains.is_empty())
        };

        for domain in &removed {
            index.unsubscribe(domain, user_id);
            tracing::debug!(%user_id, %domain, "listener unregistered");
        }

        if now_empty {
            index.entries.remove(user_id);
            drop(index);
            entry.detach().await;
            tracing::info!(%user_id, "user unregistered");
        }
    }

    /// Sets the filter applied to `domain` events for `user_id`.
    ///
    /// Returns `false` (and does nothing) for an unknown user.
    pub async fn set_event_filter(
        &self,
        user_id: &UserId,
        domain: &Domain,
        filter: Arc<dyn EventFilter>,
    ) -> bool {
        let Some(entry) = self.entry(user_id).await else {
            return false;
        };
        entry.lock().await.filters.insert(domain.clone(), filter);
        tracing::debug!(%user_id, %domain, "event filter set");
        true
    }

    /// Removes the filter for `domain` events of `user_id`.
    ///
    /// Returns `false` if there was no filter to remove.
    pub async fn remove_event_filter(&self, user_id: &UserId, domain: &Domain) -> bool {
        let Some(entry) = self.entry(user_id).await else {
            return false;
        };
        let removed = entry.lock().await.filters.remove(domain).is_some();
        if removed {
            tracing::debug!(%user_id, %domain, "event filter removed");
        }
        removed
    }

    /// Publishes `event` to every user subscribed to `domain` whose filter
    /// accepts it, waking their parked listens.
    ///
    /// Returns the number of users the event was enqueued for.
    pub async fn add_event(&self, domain: &Domain, event: Event) -> usize {
        let index = self.index.read().await;
        let Some(users) = index.subscribers.get(domain) else {
            tracing::trace!(%domain, "event for domain without subscribers dropped");
            return 0;
        };
        let mut delivered = 0;
        for user_id in users {
            if let Some(entry) = index.entries.get(user_id)
                && entry.offer_domain_event(domain, &event).await
            {
                delivered += 1;
            }
        }
        tracing::trace!(%domain, delivered, "domain event added");
        delivered
    }

    /// Publishes `event` to exactly one user, bypassing domain filters.
    ///
    /// Returns `false` if the user is unknown.
    pub async fn add_event_user_specific(&self, user_id: &UserId, event: Event) -> bool {
        match self.entry(user_id).await {
            Some(entry) => entry.offer_user_event(event).await,
            None => {
                tracing::debug!(%user_id, "user-specific event for unknown user dropped");
                false
            }
        }
    }

    /// Long-polls for the events of `user_id`.
    ///
    /// Returns as soon as events are pending, but never earlier than the
    /// minimum waiting time after the previous batch, so near-simultaneous
    /// events are coalesced. Without events it returns an empty batch once
    /// the maximum waiting time has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`EventServiceError::UninitializedClient`] if the user has no
    /// registration (never registered, unregistered, or evicted).
    pub async fn listen(&self, user_id: &UserId) -> Result<Vec<ListenEvent>, EventServiceError> {
        let entry = self
            .entry(user_id)
            .await
            .ok_or_else(|| EventServiceError::UninitializedClient(user_id.clone()))?;
        let _guard = entry.listen_guard();

        let started = Instant::now();
        let earliest = entry.begin_listen(started, self.waiting_times.min()).await;
        let deadline = started + self.waiting_times.max();

        loop {
            let notified = entry.wake_handle().notified();
            tokio::pin!(notified);
            // Register interest before checking, so a wake between the
            // check and the wait is not lost.
            notified.as_mut().enable();
            if entry.is_ready().await {
                break;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }

        if earliest > Instant::now() {
            tokio::time::sleep_until(earliest).await;
        }
        let events = entry.take_batch().await;
        tracing::trace!(user_id = %entry.user_id(), count = events.len(), "listen returned");
        Ok(events)
    }

    /// Removes every registration that has no active listen and has been
    /// idle for longer than the configured timeout.
    ///
    /// Returns the evicted users.
    pub async fn evict_idle(&self) -> Vec<UserId> {
        let now = Instant::now();
        let timeout = self.waiting_times.timeout();
        let mut index = self.index.write().await;

        let mut idle = Vec::new();
        for (user_id, entry) in &index.entries {
            if entry.is_idle(now, timeout).await {
                idle.push(user_id.clone());
            }
        }

        let mut detached = Vec::with_capacity(idle.len());
        for user_id in &idle {
            if let Some(entry) = index.entries.remove(user_id) {
                let domains: Vec<Domain> = entry.lock().await.domains.iter().cloned().collect();
                for domain in &domains {
                    index.unsubscribe(domain, user_id);
                }
                detached.push(entry);
            }
        }
        drop(index);

        for entry in detached {
            entry.detach().await;
            tracing::info!(user_id = %entry.user_id(), "idle user evicted");
        }
        idle
    }

    /// Returns the domains `user_id` is subscribed to (empty if unknown).
    pub async fn listen_domains(&self, user_id: &UserId) -> HashSet<Domain> {
        match self.entry(user_id).await {
            Some(entry) => entry.lock().await.domains.clone(),
            None => HashSet::new(),
        }
    }

    /// Returns `true` if `user_id` has a registration.
    pub async fn is_registered(&self, user_id: &UserId) -> bool {
        self.index.read().await.entries.contains_key(user_id)
    }

    /// Returns all registered users.
    pub async fn registered_users(&self) -> Vec<UserId> {
        self.index.read().await.entries.keys().cloned().collect()
    }

    /// Returns the users subscribed to `domain`.
    pub async fn subscribers(&self, domain: &Domain) -> HashSet<UserId> {
        self.index
            .read()
            .await
            .subscribers
            .get(domain)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of events buffered for `user_id`.
    pub async fn pending_event_count(&self, user_id: &UserId) -> usize {
        match self.entry(user_id).await {
            Some(entry) => entry.lock().await.queue.len(),
            None => 0,
        }
    }

    async fn entry(&self, user_id: &UserId) -> Option<Arc<RegistrationEntry>> {
        self.index.read().await.entries.get(user_id).map(Arc::clone)
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new(WaitingTimes::default())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::FilterSpec;
    use crate::domain::event::is_strictly_ordered;
    use serde_json::json;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready};

    fn registry(min: u64, max: u64, timeout: u64) -> Arc<ListenerRegistry> {
        let Ok(times) = WaitingTimes::from_millis(min, max, timeout) else {
            panic!("valid waiting times");
        };
        Arc::new(ListenerRegistry::new(times))
    }

    fn user(name: &str) -> UserId {
        UserId::from(name)
    }

    #[tokio::test]
    async fn listen_for_unknown_user_is_uninitialized() {
        let registry = registry(0, 1_000, 2_000);
        let result = registry.listen(&user("ghost")).await;
        assert!(matches!(
            result,
            Err(EventServiceError::UninitializedClient(id)) if id == user("ghost")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn buffered_events_return_immediately() {
        let registry = registry(0, 10_000, 20_000);
        let domain = Domain::new("reg_buffered");
        registry.register_listener(&user("u1"), &domain, None).await;
        assert_eq!(registry.add_event(&domain, Event::new(json!(1))).await, 1);

        let started = Instant::now();
        let Ok(events) = registry.listen(&user("u1")).await else {
            panic!("listen failed");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(registry.pending_event_count(&user("u1")).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn listen_blocks_until_event_arrives() {
        let registry = registry(0, 10_000, 20_000);
        let domain = Domain::new("reg_blocking");
        registry.register_listener(&user("u1"), &domain, None).await;

        let listener = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.listen(&user("u1")).await })
        };
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(100)).await;
        registry.add_event(&domain, Event::new(json!("x"))).await;

        let Ok(Ok(events)) = listener.await else {
            panic!("listen failed");
        };
        assert_eq!(events.len(), 1);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn listen_returns_empty_after_max_wait() {
        let registry = registry(0, 500, 1_000);
        registry
            .register_listener(&user("u1"), &Domain::new("reg_max"), None)
            .await;

        let started = Instant::now();
        let Ok(events) = registry.listen(&user("u1")).await else {
            panic!("listen failed");
        };
        assert!(events.is_empty());
        assert_eq!(started.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn min_wait_coalesces_events() {
        let registry = registry(300, 2_000, 5_000);
        let domain = Domain::new("reg_min");
        registry.register_listener(&user("u1"), &domain, None).await;

        let listener = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.listen(&user("u1")).await })
        };
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.add_event(&domain, Event::with_unique_id(1, json!(null))).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.add_event(&domain, Event::with_unique_id(2, json!(null))).await;

        let Ok(Ok(events)) = listener.await else {
            panic!("listen failed");
        };
        assert_eq!(events.len(), 2);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn min_wait_is_measured_from_last_batch() {
        let registry = registry(300, 2_000, 5_000);
        let domain = Domain::new("reg_min_batch");
        registry.register_listener(&user("u1"), &domain, None).await;
        registry.add_event(&domain, Event::new(json!(1))).await;

        let Ok(first) = registry.listen(&user("u1")).await else {
            panic!("listen failed");
        };
        assert_eq!(first.len(), 1);

        registry.add_event(&domain, Event::new(json!(2))).await;
        let started = Instant::now();
        let Ok(second) = registry.listen(&user("u1")).await else {
            panic!("listen failed");
        };
        assert_eq!(second.len(), 1);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn filter_limits_fan_out() {
        let registry = registry(0, 1_000, 2_000);
        let domain = Domain::new("reg_filter");
        registry.register_listener(&user("all"), &domain, None).await;
        registry
            .register_listener(
                &user("eth_only"),
                &domain,
                Some(Arc::new(FilterSpec::field_equals("/symbol", json!("ETH")))),
            )
            .await;

        let delivered = registry
            .add_event(&domain, Event::new(json!({"symbol": "BTC"})))
            .await;
        assert_eq!(delivered, 1);
        assert_eq!(registry.pending_event_count(&user("eth_only")).await, 0);

        assert!(registry.remove_event_filter(&user("eth_only"), &domain).await);
        let delivered = registry
            .add_event(&domain, Event::new(json!({"symbol": "BTC"})))
            .await;
        assert_eq!(delivered, 2);
    }

    #[tokio::test]
    async fn set_event_filter_is_independent_of_subscription() {
        let registry = registry(0, 1_000, 2_000);
        let domain = Domain::new("reg_filter_set");
        let other = Domain::new("reg_filter_other");
        assert!(
            !registry
                .set_event_filter(&user("u1"), &domain, Arc::new(FilterSpec::field_equals("/a", json!(1))))
                .await
        );

        registry.register_listener(&user("u1"), &other, None).await;
        assert!(
            registry
                .set_event_filter(&user("u1"), &domain, Arc::new(FilterSpec::field_equals("/a", json!(1))))
                .await
        );
        assert!(!registry.listen_domains(&user("u1")).await.contains(&domain));

        registry.register_listener(&user("u1"), &domain, None).await;
        assert_eq!(registry.add_event(&domain, Event::new(json!({"a": 2}))).await, 0);
        assert_eq!(registry.add_event(&domain, Event::new(json!({"a": 1}))).await, 1);
    }

    #[tokio::test]
    async fn user_specific_event_bypasses_filters() {
        let registry = registry(0, 1_000, 2_000);
        let domain = Domain::new("reg_user_specific");
        registry
            .register_listener(
                &user("u1"),
                &domain,
                Some(Arc::new(FilterSpec::FieldExists {
                    pointer: "/never".to_string(),
                })),
            )
            .await;
        assert!(
            registry
                .add_event_user_specific(&user("u1"), Event::new(json!("direct")))
                .await
        );
        assert!(
            !registry
                .add_event_user_specific(&user("nobody"), Event::new(json!("direct")))
                .await
        );

        let Ok(events) = registry.listen(&user("u1")).await else {
            panic!("listen failed");
        };
        assert_eq!(events.len(), 1);
        assert!(events.iter().all(ListenEvent::is_user_specific));
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let registry = registry(0, 1_000, 2_000);
        let domain = Domain::new("reg_idempotent");
        registry.register_listener(&user("u1"), &domain, None).await;
        registry.register_listener(&user("u1"), &domain, None).await;

        assert_eq!(registry.registered_users().await.len(), 1);
        assert_eq!(registry.subscribers(&domain).await.len(), 1);
        assert_eq!(registry.add_event(&domain, Event::new(json!(1))).await, 1);
        assert_eq!(registry.pending_event_count(&user("u1")).await, 1);
    }

    #[tokio::test]
    async fn final_unregister_drops_registration() {
        let registry = registry(0, 1_000, 2_000);
        let a = Domain::new("reg_unreg_a");
        let b = Domain::new("reg_unreg_b");
        registry.register_listener(&user("u1"), &a, None).await;
        registry.register_listener(&user("u1"), &b, None).await;
        registry.add_event(&a, Event::new(json!(1))).await;
        registry.add_event(&b, Event::new(json!(2))).await;

        registry.unregister_listener(&user("u1"), &a).await;
        assert!(registry.is_registered(&user("u1")).await);
        assert_eq!(registry.pending_event_count(&user("u1")).await, 1);
        assert!(registry.subscribers(&a).await.is_empty());

        // Unknown domain and unknown user are harmless no-ops.
        registry
            .unregister_listener(&user("u1"), &Domain::new("reg_never"))
            .await;
        registry.unregister_listeners(&user("nobody")).await;
        assert!(registry.is_registered(&user("u1")).await);

        registry
            .unregister_listener_domains(&user("u1"), &[b.clone()])
            .await;
        assert!(!registry.is_registered(&user("u1")).await);
        assert!(registry.listen_domains(&user("u1")).await.is_empty());
        assert!(registry.listen(&user("u1")).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn unregister_releases_parked_listen() {
        let registry = registry(0, 10_000, 20_000);
        let domain = Domain::new("reg_release");
        registry.register_listener(&user("u1"), &domain, None).await;

        let listener = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.listen(&user("u1")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let started = Instant::now();
        registry.unregister_listeners(&user("u1")).await;

        let Ok(Ok(events)) = listener.await else {
            panic!("listen failed");
        };
        assert!(events.is_empty());
        assert!(started.elapsed() < Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn parked_listen_does_not_block_other_users() {
        let registry = registry(0, 60_000, 120_000);
        let domain = Domain::new("reg_isolation");
        registry.register_listener(&user("a"), &domain, None).await;
        registry.register_listener(&user("b"), &domain, None).await;

        let a = user("a");
        let mut parked = tokio_test::task::spawn(registry.listen(&a));
        assert_pending!(parked.poll());

        assert!(
            registry
                .add_event_user_specific(&user("b"), Event::new(json!("for b")))
                .await
        );
        let Ok(events) = registry.listen(&user("b")).await else {
            panic!("listen failed");
        };
        assert_eq!(events.len(), 1);
        assert_pending!(parked.poll());

        registry.add_event(&domain, Event::new(json!("for all"))).await;
        assert!(parked.is_woken());
        let result = assert_ready!(parked.poll());
        assert!(result.is_ok_and(|events| events.len() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_users_are_evicted() {
        let registry = registry(0, 100, 1_000);
        let domain = Domain::new("reg_evict");
        registry.register_listener(&user("idle"), &domain, None).await;
        registry.register_listener(&user("busy"), &domain, None).await;

        let busy = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for _ in 0..20 {
                    if registry.listen(&user("busy")).await.is_err() {
                        return false;
                    }
                }
                true
            })
        };

        tokio::time::sleep(Duration::from_millis(1_450)).await;
        let evicted = registry.evict_idle().await;
        assert_eq!(evicted, vec![user("idle")]);
        assert!(!registry.is_registered(&user("idle")).await);
        assert!(registry.is_registered(&user("busy")).await);
        assert_eq!(registry.subscribers(&domain).await.len(), 1);

        assert!(matches!(
            registry.listen(&user("idle")).await,
            Err(EventServiceError::UninitializedClient(_))
        ));
        assert!(matches!(busy.await, Ok(true)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn delivery_preserves_add_order() {
        const EVENTS: u64 = 200;
        let registry = registry(0, 1_000, 10_000);
        let domain = Domain::new("reg_order");
        registry.register_listener(&user("u1"), &domain, None).await;

        let producer = {
            let registry = Arc::clone(&registry);
            let domain = domain.clone();
            tokio::spawn(async move {
                for id in 1..=EVENTS {
                    if id % 3 == 0 {
                        registry
                            .add_event_user_specific(&user("u1"), Event::with_unique_id(id, json!(null)))
                            .await;
                    } else {
                        registry
                            .add_event(&domain, Event::with_unique_id(id, json!(null)))
                            .await;
                    }
                    if id % 10 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        let mut received = Vec::new();
        while (received.len() as u64) < EVENTS {
            let Ok(batch) = registry.listen(&user("u1")).await else {
                panic!("listen failed");
            };
            received.extend(batch.into_iter().map(|e| e.event));
        }
        assert!(producer.await.is_ok());
        assert_eq!(received.len() as u64, EVENTS);
        assert!(is_strictly_ordered(&received));
    }
}
