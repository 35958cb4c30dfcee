//! Scripted gateway and recording listener for client tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, oneshot};

use super::{RemoteEventListener, RemoteGateway};
use crate::domain::event::is_strictly_ordered;
use crate::domain::{Domain, FilterSpec, ListenEvent, UserId};
use crate::error::RemoteCallError;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A call the client made against the gateway.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RemoteCall {
    Register {
        domain: Domain,
        filter: Option<FilterSpec>,
    },
    Unlisten(Vec<Domain>),
    Listen,
    RegisterEventFilter(Domain, FilterSpec),
    DeregisterEventFilter(Domain),
}

/// Gateway answering from scripted results.
///
/// Register, unlisten and filter calls succeed unless a result was queued.
/// Listen calls park until a result is pushed.
#[derive(Debug, Default)]
pub(crate) struct MockGateway {
    calls: Mutex<Vec<RemoteCall>>,
    register_results: Mutex<VecDeque<Result<(), RemoteCallError>>>,
    unlisten_results: Mutex<VecDeque<Result<(), RemoteCallError>>>,
    filter_results: Mutex<VecDeque<Result<(), RemoteCallError>>>,
    listen_results: Mutex<VecDeque<Result<Vec<ListenEvent>, RemoteCallError>>>,
    listen_ready: Notify,
    register_gate: Mutex<Option<oneshot::Receiver<()>>>,
    unlisten_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockGateway {
    pub(crate) fn push_register(&self, result: Result<(), RemoteCallError>) {
        locked(&self.register_results).push_back(result);
    }

    pub(crate) fn push_unlisten(&self, result: Result<(), RemoteCallError>) {
        locked(&self.unlisten_results).push_back(result);
    }

    pub(crate) fn push_filter(&self, result: Result<(), RemoteCallError>) {
        locked(&self.filter_results).push_back(result);
    }

    pub(crate) fn push_listen(&self, result: Result<Vec<ListenEvent>, RemoteCallError>) {
        locked(&self.listen_results).push_back(result);
        self.listen_ready.notify_one();
    }

    /// Holds the next register call until the returned sender fires.
    pub(crate) fn hold_next_register(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *locked(&self.register_gate) = Some(gate);
        release
    }

    /// Holds the next unlisten call until the returned sender fires.
    pub(crate) fn hold_next_unlisten(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *locked(&self.unlisten_gate) = Some(gate);
        release
    }

    pub(crate) fn calls(&self) -> Vec<RemoteCall> {
        locked(&self.calls).clone()
    }

    pub(crate) fn register_calls(&self) -> usize {
        locked(&self.calls)
            .iter()
            .filter(|call| matches!(call, RemoteCall::Register { .. }))
            .count()
    }

    pub(crate) fn listen_calls(&self) -> usize {
        locked(&self.calls)
            .iter()
            .filter(|call| matches!(call, RemoteCall::Listen))
            .count()
    }

    pub(crate) fn unlisten_calls(&self) -> Vec<Vec<Domain>> {
        locked(&self.calls)
            .iter()
            .filter_map(|call| match call {
                RemoteCall::Unlisten(domains) => Some(domains.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RemoteCall) {
        locked(&self.calls).push(call);
    }
}

impl RemoteGateway for MockGateway {
    async fn register(
        &self,
        _user_id: &UserId,
        domain: &Domain,
        filter: Option<&FilterSpec>,
    ) -> Result<(), RemoteCallError> {
        self.record(RemoteCall::Register {
            domain: domain.clone(),
            filter: filter.cloned(),
        });
        let gate = locked(&self.register_gate).take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        locked(&self.register_results).pop_front().unwrap_or(Ok(()))
    }

    async fn unlisten(&self, _user_id: &UserId, domains: &[Domain]) -> Result<(), RemoteCallError> {
        self.record(RemoteCall::Unlisten(domains.to_vec()));
        let gate = locked(&self.unlisten_gate).take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        locked(&self.unlisten_results).pop_front().unwrap_or(Ok(()))
    }

    async fn listen(&self, _user_id: &UserId) -> Result<Vec<ListenEvent>, RemoteCallError> {
        self.record(RemoteCall::Listen);
        loop {
            let next = locked(&self.listen_results).pop_front();
            if let Some(result) = next {
                return result;
            }
            self.listen_ready.notified().await;
        }
    }

    async fn register_event_filter(
        &self,
        _user_id: &UserId,
        domain: &Domain,
        filter: &FilterSpec,
    ) -> Result<(), RemoteCallError> {
        self.record(RemoteCall::RegisterEventFilter(domain.clone(), filter.clone()));
        locked(&self.filter_results).pop_front().unwrap_or(Ok(()))
    }

    async fn deregister_event_filter(
        &self,
        _user_id: &UserId,
        domain: &Domain,
    ) -> Result<(), RemoteCallError> {
        self.record(RemoteCall::DeregisterEventFilter(domain.clone()));
        locked(&self.filter_results).pop_front().unwrap_or(Ok(()))
    }
}

/// Listener that records what it was handed.
#[derive(Debug, Default)]
pub(crate) struct RecordingListener {
    events: Mutex<Vec<ListenEvent>>,
    unlistened: Mutex<Vec<Domain>>,
}

impl RecordingListener {
    pub(crate) fn count(&self) -> usize {
        locked(&self.events).len()
    }

    pub(crate) fn count_for(&self, domain: &Domain) -> usize {
        locked(&self.events)
            .iter()
            .filter(|event| event.domain.as_ref() == Some(domain))
            .count()
    }

    pub(crate) fn is_ordered(&self) -> bool {
        let events = locked(&self.events);
        is_strictly_ordered(events.iter().map(|listen| &listen.event))
    }

    pub(crate) fn unlistened(&self) -> Vec<Domain> {
        locked(&self.unlistened).clone()
    }
}

impl RemoteEventListener for RecordingListener {
    fn apply(&self, event: &ListenEvent) {
        locked(&self.events).push(event.clone());
    }

    fn on_unlisten(&self, domain: &Domain) {
        locked(&self.unlistened).push(domain.clone());
    }
}

/// Yields to the runtime until `condition` holds, for at most one second.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}
