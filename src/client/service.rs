//! Client registration state machine and listen loop.
//!
//! [`RemoteEventService`] turns local `add_listener` / `remove_listener`
//! calls into the minimal set of remote register/unlisten calls and keeps
//! a single listen loop running while any domain has listeners.
//!
//! Per domain the state moves
//! `Unregistered → Registering → Registered → Unregistering → Unregistered`.
//! At most one register call per domain is outstanding at a time:
//!
//! - a listener added while the domain is `Registering` joins the in-flight
//!   call and shares its outcome through a [`tokio::sync::watch`] channel;
//! - the last listener leaving a `Registering` domain only marks it for
//!   teardown, and the unlisten goes out once the register call returned;
//! - a listener added while the domain is `Unregistering` waits for the
//!   unlisten to finish before registering again.
//!
//! A domain whose registration fails is discarded, never left half
//! registered.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{RemoteEventListener, RemoteGateway};
use crate::domain::{Domain, FilterSpec, ListenEvent, UserId};
use crate::error::RemoteCallError;

/// Successful outcome of a client operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The remote call behind the operation succeeded.
    Confirmed,
    /// Succeeded locally without a remote call (listener added to a domain
    /// that is already registered).
    Local,
    /// Nothing had to be done; neither success nor failure applies.
    Noop,
}

/// Registration phase of a domain known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// The register call is in flight.
    Registering,
    /// The server confirmed the registration.
    Registered,
    /// The last listener left; the unlisten call is pending or in flight.
    Unregistering,
}

#[derive(Debug, Clone)]
enum RegistrationStatus {
    Registering,
    Registered,
    Unregistering,
    /// Register call failed; the domain is gone.
    Failed(RemoteCallError),
    /// Teardown finished with this unlisten outcome; the domain is gone.
    Unlistened(Result<(), RemoteCallError>),
}

impl RegistrationStatus {
    const fn is_settled(&self) -> bool {
        !matches!(self, Self::Registering | Self::Unregistering)
    }
}

#[derive(Debug)]
struct DomainListenerState {
    generation: u64,
    listeners: Vec<Arc<dyn RemoteEventListener>>,
    filter: Option<FilterSpec>,
    status: watch::Sender<RegistrationStatus>,
}

impl DomainListenerState {
    fn new(
        generation: u64,
        listener: Arc<dyn RemoteEventListener>,
        filter: Option<FilterSpec>,
    ) -> Self {
        let (status, _) = watch::channel(RegistrationStatus::Registering);
        Self {
            generation,
            listeners: vec![listener],
            filter,
            status,
        }
    }

    fn phase(&self) -> RegistrationState {
        match *self.status.borrow() {
            RegistrationStatus::Registered => RegistrationState::Registered,
            RegistrationStatus::Registering if !self.listeners.is_empty() => {
                RegistrationState::Registering
            }
            _ => RegistrationState::Unregistering,
        }
    }

    fn is_registered(&self) -> bool {
        matches!(*self.status.borrow(), RegistrationStatus::Registered)
    }

    fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    fn insert_listener(&mut self, listener: Arc<dyn RemoteEventListener>) {
        if !self.listeners.iter().any(|known| Arc::ptr_eq(known, &listener)) {
            self.listeners.push(listener);
        }
    }

    fn remove_listener(&mut self, listener: &Arc<dyn RemoteEventListener>) {
        self.listeners.retain(|known| !Arc::ptr_eq(known, listener));
    }
}

#[derive(Debug)]
struct ListenLoop {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct ClientState {
    domains: HashMap<Domain, DomainListenerState>,
    listen_loop: Option<ListenLoop>,
    next_generation: u64,
}

impl ClientState {
    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn is_active(&self) -> bool {
        self.domains.values().any(DomainListenerState::has_listeners)
    }

    fn is_listening(&self) -> bool {
        self.listen_loop
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    fn stop_listen_loop_if_idle(&mut self) {
        if !self.is_active()
            && let Some(running) = self.listen_loop.take()
        {
            running.handle.abort();
            tracing::info!("listen loop stopped, no domains left");
        }
    }

    /// Removes the domain if it still belongs to `generation` and publishes
    /// its final status.
    fn settle(&mut self, domain: &Domain, generation: u64, status: RegistrationStatus) {
        if self
            .domains
            .get(domain)
            .is_some_and(|current| current.generation == generation)
            && let Some(done) = self.domains.remove(domain)
        {
            done.status.send_replace(status);
        }
    }

    /// Listeners for an event of `domain`; user-specific events go to every
    /// distinct listener once.
    fn listeners_for(&self, domain: Option<&Domain>) -> Vec<Arc<dyn RemoteEventListener>> {
        match domain {
            Some(domain) => self
                .domains
                .get(domain)
                .map(|state| state.listeners.clone())
                .unwrap_or_default(),
            None => {
                let mut all: Vec<Arc<dyn RemoteEventListener>> = Vec::new();
                for state in self.domains.values() {
                    for listener in &state.listeners {
                        if !all.iter().any(|known| Arc::ptr_eq(known, listener)) {
                            all.push(Arc::clone(listener));
                        }
                    }
                }
                all
            }
        }
    }
}

struct ServiceInner<G> {
    user_id: UserId,
    gateway: G,
    state: Mutex<ClientState>,
}

impl<G> ServiceInner<G> {
    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Client-side event service.
///
/// Cheap to clone; all clones share one state and one listen loop. The
/// listen loop runs on the tokio runtime the first registration completes
/// on and ends once every clone is dropped.
pub struct RemoteEventService<G> {
    inner: Arc<ServiceInner<G>>,
}

impl<G> Clone for RemoteEventService<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G> fmt::Debug for RemoteEventService<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEventService")
            .field("user_id", &self.inner.user_id)
            .finish_non_exhaustive()
    }
}

enum AddPlan {
    Register(u64),
    Join(watch::Receiver<RegistrationStatus>),
    AlreadyRegistered,
    AwaitTeardown(watch::Receiver<RegistrationStatus>),
}

/// What happens after a register call returned.
enum RegisterOutcome {
    Settled,
    /// Every listener left while registering; unlisten the domain.
    Teardown,
    /// The domain was dropped meanwhile (lost session); undo the
    /// registration on the server.
    Orphaned,
}

enum RemovePlan {
    Teardown(Vec<(Domain, u64)>),
    AwaitRegistration(watch::Receiver<RegistrationStatus>),
}

impl<G: RemoteGateway> RemoteEventService<G> {
    /// Creates a service talking to `gateway` as `user_id`.
    #[must_use]
    pub fn new(gateway: G, user_id: UserId) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                user_id,
                gateway,
                state: Mutex::new(ClientState::default()),
            }),
        }
    }

    /// Creates a service with a freshly minted anonymous identity.
    #[must_use]
    pub fn anonymous(gateway: G) -> Self {
        Self::new(gateway, UserId::anonymous())
    }

    /// Identity this client registers as.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.inner.user_id
    }

    /// The underlying gateway.
    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.inner.gateway
    }

    /// Adds `listener` for `domain`.
    ///
    /// The first listener of a domain triggers one remote register call;
    /// further listeners never do. A listener added while the register call
    /// is in flight resolves with that call's outcome. A listener added
    /// while the domain is being unregistered waits for the unlisten call
    /// and then registers the domain again.
    ///
    /// # Errors
    ///
    /// Returns the [`RemoteCallError`] of the register call if it failed. The
    /// domain is then discarded locally.
    pub async fn add_listener(
        &self,
        domain: Domain,
        listener: Arc<dyn RemoteEventListener>,
    ) -> Result<Ack, RemoteCallError> {
        self.add(domain, listener, None).await
    }

    /// Adds `listener` for `domain` with a server-side event filter.
    ///
    /// For a domain that is already known locally the filter is sent with a
    /// separate register-event-filter call instead of a new registration.
    ///
    /// # Errors
    ///
    /// Returns the [`RemoteCallError`] of the register or filter call.
    pub async fn add_listener_with_filter(
        &self,
        domain: Domain,
        listener: Arc<dyn RemoteEventListener>,
        filter: FilterSpec,
    ) -> Result<Ack, RemoteCallError> {
        self.add(domain, listener, Some(filter)).await
    }

    async fn add(
        &self,
        domain: Domain,
        listener: Arc<dyn RemoteEventListener>,
        filter: Option<FilterSpec>,
    ) -> Result<Ack, RemoteCallError> {
        loop {
            let plan = {
                let mut state = self.inner.lock_state();
                if let Some(existing) = state.domains.get_mut(&domain) {
                    if matches!(*existing.status.borrow(), RegistrationStatus::Unregistering) {
                        AddPlan::AwaitTeardown(existing.status.subscribe())
                    } else {
                        existing.insert_listener(Arc::clone(&listener));
                        if existing.is_registered() {
                            AddPlan::AlreadyRegistered
                        } else {
                            AddPlan::Join(existing.status.subscribe())
                        }
                    }
                } else {
                    let generation = state.next_generation();
                    state.domains.insert(
                        domain.clone(),
                        DomainListenerState::new(
                            generation,
                            Arc::clone(&listener),
                            filter.clone(),
                        ),
                    );
                    AddPlan::Register(generation)
                }
            };

            return match plan {
                AddPlan::AwaitTeardown(mut status) => {
                    tracing::debug!(%domain, "waiting for unlisten before registering again");
                    let _ = status.wait_for(RegistrationStatus::is_settled).await;
                    continue;
                }
                AddPlan::Register(generation) => {
                    self.register(&domain, generation, filter.as_ref()).await
                }
                AddPlan::Join(mut status) => {
                    let outcome = status
                        .wait_for(|status| !matches!(status, RegistrationStatus::Registering))
                        .await
                        .map(|status| status.clone());
                    match outcome {
                        Ok(RegistrationStatus::Failed(err)) => Err(err),
                        Ok(RegistrationStatus::Registered) => match filter {
                            Some(filter) => self.register_event_filter(domain, filter).await,
                            None => Ok(Ack::Confirmed),
                        },
                        // Every listener left before the registration completed.
                        Ok(_) | Err(_) => Ok(Ack::Noop),
                    }
                }
                AddPlan::AlreadyRegistered => {
                    self.ensure_listen_loop();
                    match filter {
                        Some(filter) => self.register_event_filter(domain, filter).await,
                        None => Ok(Ack::Local),
                    }
                }
            };
        }
    }

    async fn register(
        &self,
        domain: &Domain,
        generation: u64,
        filter: Option<&FilterSpec>,
    ) -> Result<Ack, RemoteCallError> {
        tracing::debug!(user_id = %self.inner.user_id, %domain, "registering domain");
        let result = self
            .inner
            .gateway
            .register(&self.inner.user_id, domain, filter)
            .await;
        let succeeded = result.is_ok();
        match self.complete_registration(domain, generation, result.clone()) {
            RegisterOutcome::Settled => result.map(|()| Ack::Confirmed),
            RegisterOutcome::Teardown => {
                // The caller's listener is gone; the unlisten outcome goes to
                // whoever removed it.
                let _ = self.teardown(vec![(domain.clone(), generation)]).await;
                result.map(|()| Ack::Confirmed)
            }
            RegisterOutcome::Orphaned if succeeded => {
                if let Err(err) = self
                    .inner
                    .gateway
                    .unlisten(&self.inner.user_id, std::slice::from_ref(domain))
                    .await
                {
                    tracing::debug!(%domain, %err, "unlisten of orphaned registration failed");
                }
                Ok(Ack::Noop)
            }
            RegisterOutcome::Orphaned => Ok(Ack::Noop),
        }
    }

    fn complete_registration(
        &self,
        domain: &Domain,
        generation: u64,
        result: Result<(), RemoteCallError>,
    ) -> RegisterOutcome {
        let mut state = self.inner.lock_state();
        let Some(current) = state
            .domains
            .get(domain)
            .filter(|current| current.generation == generation)
        else {
            tracing::debug!(%domain, "registration finished for a domain dropped meanwhile");
            return RegisterOutcome::Orphaned;
        };
        match result {
            Ok(()) if !current.has_listeners() => {
                current
                    .status
                    .send_replace(RegistrationStatus::Unregistering);
                tracing::debug!(%domain, "registered without listeners, unregistering");
                RegisterOutcome::Teardown
            }
            Ok(()) => {
                current.status.send_replace(RegistrationStatus::Registered);
                tracing::info!(user_id = %self.inner.user_id, %domain, "domain registered");
                self.start_listen_loop(&mut state);
                RegisterOutcome::Settled
            }
            Err(err) => {
                tracing::warn!(user_id = %self.inner.user_id, %domain, %err, "registration failed");
                state.settle(domain, generation, RegistrationStatus::Failed(err));
                RegisterOutcome::Settled
            }
        }
    }

    fn ensure_listen_loop(&self) {
        let mut state = self.inner.lock_state();
        self.start_listen_loop(&mut state);
    }

    fn start_listen_loop(&self, state: &mut ClientState) {
        let has_registered = state
            .domains
            .values()
            .any(|current| current.is_registered() && current.has_listeners());
        if state.is_listening() || !has_registered {
            return;
        }
        let generation = state.next_generation();
        let handle = tokio::spawn(run_listen_loop(Arc::downgrade(&self.inner), generation));
        state.listen_loop = Some(ListenLoop { generation, handle });
        tracing::info!(user_id = %self.inner.user_id, "listen loop started");
    }

    /// Removes `listener` from `domain`.
    ///
    /// Removing the last listener of a domain issues one unlisten call;
    /// removing the last domain also stops the listen loop. If the domain is
    /// still registering, the unlisten waits for the register call, and a
    /// listener added meanwhile cancels the teardown. Returns [`Ack::Noop`]
    /// when no remote call was needed.
    ///
    /// # Errors
    ///
    /// Returns the [`RemoteCallError`] of the unlisten call.
    pub async fn remove_listener(
        &self,
        domain: &Domain,
        listener: &Arc<dyn RemoteEventListener>,
    ) -> Result<Ack, RemoteCallError> {
        let plan = {
            let mut state = self.inner.lock_state();
            let Some(current) = state.domains.get_mut(domain) else {
                return Ok(Ack::Noop);
            };
            if !current.has_listeners() {
                return Ok(Ack::Noop);
            }
            current.remove_listener(listener);
            if current.has_listeners() {
                return Ok(Ack::Noop);
            }
            let plan = Self::plan_teardown(domain, current);
            state.stop_listen_loop_if_idle();
            plan
        };
        match plan {
            RemovePlan::Teardown(targets) => self.teardown(targets).await.map(|()| Ack::Confirmed),
            RemovePlan::AwaitRegistration(status) => await_teardown(status).await,
        }
    }

    /// Marks a domain whose last listener just left for teardown.
    fn plan_teardown(domain: &Domain, current: &DomainListenerState) -> RemovePlan {
        if current.is_registered() {
            current
                .status
                .send_replace(RegistrationStatus::Unregistering);
            RemovePlan::Teardown(vec![(domain.clone(), current.generation)])
        } else {
            RemovePlan::AwaitRegistration(current.status.subscribe())
        }
    }

    /// Removes all listeners of all domains with one batched unlisten call.
    ///
    /// # Errors
    ///
    /// Returns the [`RemoteCallError`] of the unlisten call.
    pub async fn remove_listeners(&self) -> Result<Ack, RemoteCallError> {
        self.remove_domains(None).await
    }

    /// Removes all listeners of `domain`. Unknown domains are skipped
    /// without a remote call.
    ///
    /// # Errors
    ///
    /// Returns the [`RemoteCallError`] of the unlisten call.
    pub async fn remove_listeners_for(&self, domain: &Domain) -> Result<Ack, RemoteCallError> {
        self.remove_domains(Some(vec![domain.clone()])).await
    }

    /// Removes all listeners of every domain in `domains`, batching the
    /// registered ones into one unlisten call.
    ///
    /// # Errors
    ///
    /// Returns the [`RemoteCallError`] of the unlisten call.
    pub async fn remove_listeners_for_domains(
        &self,
        domains: &HashSet<Domain>,
    ) -> Result<Ack, RemoteCallError> {
        self.remove_domains(Some(domains.iter().cloned().collect()))
            .await
    }

    async fn remove_domains(&self, requested: Option<Vec<Domain>>) -> Result<Ack, RemoteCallError> {
        let (mut targets, pending) = {
            let mut state = self.inner.lock_state();
            let requested =
                requested.unwrap_or_else(|| state.domains.keys().cloned().collect());
            let mut targets = Vec::new();
            let mut pending = Vec::new();
            for domain in requested {
                let Some(current) = state.domains.get_mut(&domain) else {
                    continue;
                };
                if !current.has_listeners() {
                    continue;
                }
                current.listeners.clear();
                match Self::plan_teardown(&domain, current) {
                    RemovePlan::Teardown(mut planned) => targets.append(&mut planned),
                    RemovePlan::AwaitRegistration(status) => pending.push(status),
                }
            }
            state.stop_listen_loop_if_idle();
            (targets, pending)
        };
        if targets.is_empty() && pending.is_empty() {
            return Ok(Ack::Noop);
        }

        targets.sort_by(|a, b| a.0.cmp(&b.0));
        let mut ack = Ack::Noop;
        let mut failure = None;
        if !targets.is_empty() {
            match self.teardown(targets).await {
                Ok(()) => ack = Ack::Confirmed,
                Err(err) => failure = Some(err),
            }
        }
        for status in pending {
            match await_teardown(status).await {
                Ok(Ack::Confirmed) => ack = Ack::Confirmed,
                Ok(_) => {}
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        failure.map_or(Ok(ack), Err)
    }

    /// Sends one unlisten for `targets` and drops them locally whatever the
    /// outcome.
    async fn teardown(&self, targets: Vec<(Domain, u64)>) -> Result<(), RemoteCallError> {
        let domains: Vec<Domain> = targets.iter().map(|(domain, _)| domain.clone()).collect();
        let result = self
            .inner
            .gateway
            .unlisten(&self.inner.user_id, &domains)
            .await;
        match &result {
            Ok(()) => tracing::debug!(user_id = %self.inner.user_id, ?domains, "unlistened"),
            Err(err) => {
                tracing::warn!(user_id = %self.inner.user_id, ?domains, %err, "unlisten failed");
            }
        }
        let mut state = self.inner.lock_state();
        for (domain, generation) in &targets {
            state.settle(
                domain,
                *generation,
                RegistrationStatus::Unlistened(result.clone()),
            );
        }
        result
    }

    /// Sets the server-side filter for `domain`. Registration and the
    /// listen loop are left untouched.
    ///
    /// # Errors
    ///
    /// Returns the [`RemoteCallError`] of the filter call.
    pub async fn register_event_filter(
        &self,
        domain: Domain,
        filter: FilterSpec,
    ) -> Result<Ack, RemoteCallError> {
        self.inner
            .gateway
            .register_event_filter(&self.inner.user_id, &domain, &filter)
            .await
            .inspect_err(|err| tracing::warn!(%domain, %err, "register event filter failed"))?;
        if let Some(current) = self.inner.lock_state().domains.get_mut(&domain) {
            current.filter = Some(filter);
        }
        Ok(Ack::Confirmed)
    }

    /// Removes the server-side filter for `domain`. Registration and the
    /// listen loop are left untouched.
    ///
    /// # Errors
    ///
    /// Returns the [`RemoteCallError`] of the filter call.
    pub async fn deregister_event_filter(&self, domain: Domain) -> Result<Ack, RemoteCallError> {
        self.inner
            .gateway
            .deregister_event_filter(&self.inner.user_id, &domain)
            .await
            .inspect_err(|err| tracing::warn!(%domain, %err, "deregister event filter failed"))?;
        if let Some(current) = self.inner.lock_state().domains.get_mut(&domain) {
            current.filter = None;
        }
        Ok(Ack::Confirmed)
    }

    /// Returns `true` while at least one domain has listeners, whether its
    /// registration is confirmed or still in flight.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.lock_state().is_active()
    }

    /// Returns `true` while the listen loop runs.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.inner.lock_state().is_listening()
    }

    /// Registration phase of `domain`, `None` once it is fully unregistered.
    #[must_use]
    pub fn registration_state(&self, domain: &Domain) -> Option<RegistrationState> {
        self.inner
            .lock_state()
            .domains
            .get(domain)
            .map(DomainListenerState::phase)
    }

    /// Number of local listeners on `domain`.
    #[must_use]
    pub fn listener_count(&self, domain: &Domain) -> usize {
        self.inner
            .lock_state()
            .domains
            .get(domain)
            .map_or(0, |current| current.listeners.len())
    }

    /// The filter last confirmed for `domain`.
    #[must_use]
    pub fn event_filter(&self, domain: &Domain) -> Option<FilterSpec> {
        self.inner
            .lock_state()
            .domains
            .get(domain)
            .and_then(|current| current.filter.clone())
    }

    /// Domains that currently have listeners, sorted by name.
    #[must_use]
    pub fn active_domains(&self) -> Vec<Domain> {
        let mut domains: Vec<Domain> = self
            .inner
            .lock_state()
            .domains
            .iter()
            .filter(|(_, current)| current.has_listeners())
            .map(|(domain, _)| domain.clone())
            .collect();
        domains.sort();
        domains
    }
}

/// Waits until a domain marked for teardown during its registration is
/// settled, and reports the unlisten outcome.
async fn await_teardown(
    mut status: watch::Receiver<RegistrationStatus>,
) -> Result<Ack, RemoteCallError> {
    let outcome = status
        .wait_for(RegistrationStatus::is_settled)
        .await
        .map(|status| status.clone());
    match outcome {
        Ok(RegistrationStatus::Unlistened(result)) => result.map(|()| Ack::Confirmed),
        // Registration failed, was re-joined, or the session was dropped.
        Ok(_) | Err(_) => Ok(Ack::Noop),
    }
}

/// Body of the listen loop. Holds the service only weakly between
/// iterations so dropping every handle ends the loop.
async fn run_listen_loop<G: RemoteGateway>(inner: Weak<ServiceInner<G>>, generation: u64) {
    loop {
        let Some(service) = inner.upgrade() else {
            tracing::debug!("service dropped, listen loop exiting");
            return;
        };
        match service.gateway.listen(&service.user_id).await {
            Ok(events) => {
                if !dispatch(&service, &events) {
                    finish_listen_loop(&service, generation);
                    return;
                }
            }
            Err(RemoteCallError::Uninitialized) => {
                tracing::warn!(user_id = %service.user_id, "server lost this client, dropping local registrations");
                drop_session(&service, generation).await;
                return;
            }
            Err(err) => {
                tracing::warn!(user_id = %service.user_id, %err, "listen failed, stopping listen loop");
                finish_listen_loop(&service, generation);
                return;
            }
        }
    }
}

/// Hands every event to the listeners of its domain, in registration
/// order. Returns `false` once no domain has listeners.
fn dispatch<G>(service: &ServiceInner<G>, events: &[ListenEvent]) -> bool {
    for event in events {
        let listeners = service.lock_state().listeners_for(event.domain.as_ref());
        for listener in &listeners {
            listener.apply(event);
        }
    }
    service.lock_state().is_active()
}

fn finish_listen_loop<G>(service: &ServiceInner<G>, generation: u64) {
    let mut state = service.lock_state();
    if state
        .listen_loop
        .as_ref()
        .is_some_and(|running| running.generation == generation)
    {
        state.listen_loop = None;
        tracing::info!(user_id = %service.user_id, "listen loop stopped");
    }
}

/// Drops all local registrations after the server forgot this client and
/// tells the server to forget the domains as well.
async fn drop_session<G: RemoteGateway>(service: &ServiceInner<G>, generation: u64) {
    finish_listen_loop(service, generation);
    let dropped: Vec<(Domain, Vec<Arc<dyn RemoteEventListener>>)> = service
        .lock_state()
        .domains
        .drain()
        .map(|(domain, state)| (domain, state.listeners))
        .collect();

    for (domain, listeners) in &dropped {
        for listener in listeners {
            listener.on_unlisten(domain);
        }
    }

    let mut domains: Vec<Domain> = dropped.into_iter().map(|(domain, _)| domain).collect();
    if domains.is_empty() {
        return;
    }
    domains.sort();
    if let Err(err) = service.gateway.unlisten(&service.user_id, &domains).await {
        tracing::debug!(%err, "unlisten after lost session failed");
    }
}
