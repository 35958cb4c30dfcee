//! Domain layer: value types shared by the server registry and the client.
//!
//! Contains the interned topic identifier, recipient identity, the event
//! payload with its delivery envelope, and the event filter contract.

pub mod event;
pub mod event_domain;
pub mod event_filter;
pub mod user_id;

pub use event::{Event, ListenEvent};
pub use event_domain::Domain;
pub use event_filter::{EventFilter, FilterSpec};
pub use user_id::UserId;
