//! # longpoll-gateway
//!
//! Domain-scoped long-polling event service.
//!
//! Clients subscribe to named domains and pull events with blocking
//! `listen` calls. The server side buffers events per client in a
//! [`registry::ListenerRegistry`], answers a listen as soon as events are
//! pending (but never before the minimum waiting time) and evicts clients
//! that stopped polling. The client side, [`client::RemoteEventService`],
//! turns local listener bookkeeping into the minimal set of remote
//! register/unlisten calls and runs one listen loop per client.
//!
//! ## Architecture
//!
//! ```text
//! Producers                        Consumers
//!     │                                │
//!     ├── REST Handlers (api/) ◄───────┤  HttpGateway (client/)
//!     │                                │
//!     ├── ListenerRegistry (registry/) │  RemoteEventService (client/)
//!     ├── EvictionTask (registry/)     │      └── RemoteEventListener
//!     │                                │
//!     └── Domain, Event, FilterSpec (domain/)
//! ```

pub mod api;
pub mod app_state;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod registry;
