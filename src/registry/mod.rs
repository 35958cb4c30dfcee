//! Server side: per-recipient queues, the listener registry with its
//! blocking listen protocol, and idle eviction.

pub mod event_queue;
pub mod eviction;
pub mod listener_registry;
mod registration_entry;

pub use event_queue::EventQueue;
pub use eviction::EvictionTask;
pub use listener_registry::ListenerRegistry;
