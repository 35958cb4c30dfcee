//! Client side of the event service.
//!
//! [`RemoteEventService`] keeps per-domain listener sets, issues remote
//! register/unlisten calls through a [`RemoteGateway`], and runs the
//! long-poll listen loop that fans events out to [`RemoteEventListener`]s.
//! [`HttpGateway`] is the gateway speaking the service's REST API.

pub mod gateway;
pub mod http_gateway;
pub mod listener;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use gateway::RemoteGateway;
pub use http_gateway::HttpGateway;
pub use listener::RemoteEventListener;
pub use service::{Ack, RegistrationState, RemoteEventService};
