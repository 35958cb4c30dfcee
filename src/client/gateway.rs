//! Remote call boundary between the client state machine and the server.

use std::future::Future;

use crate::domain::{Domain, FilterSpec, ListenEvent, UserId};
use crate::error::RemoteCallError;

/// Asynchronous calls the client issues against the event service.
///
/// Each call yields exactly one success or one failure. Implementations
/// must be usable from a spawned task, hence the `Send` futures.
pub trait RemoteGateway: Send + Sync + 'static {
    /// Subscribes `user_id` to `domain`, optionally with a filter.
    fn register(
        &self,
        user_id: &UserId,
        domain: &Domain,
        filter: Option<&FilterSpec>,
    ) -> impl Future<Output = Result<(), RemoteCallError>> + Send;

    /// Unsubscribes `user_id` from `domains` in one call.
    fn unlisten(
        &self,
        user_id: &UserId,
        domains: &[Domain],
    ) -> impl Future<Output = Result<(), RemoteCallError>> + Send;

    /// Long-polls for pending events.
    fn listen(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<ListenEvent>, RemoteCallError>> + Send;

    /// Sets the filter for `domain` events of `user_id`.
    fn register_event_filter(
        &self,
        user_id: &UserId,
        domain: &Domain,
        filter: &FilterSpec,
    ) -> impl Future<Output = Result<(), RemoteCallError>> + Send;

    /// Removes the filter for `domain` events of `user_id`.
    fn deregister_event_filter(
        &self,
        user_id: &UserId,
        domain: &Domain,
    ) -> impl Future<Output = Result<(), RemoteCallError>> + Send;
}
