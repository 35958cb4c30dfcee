//! Application-side event listeners.

use std::fmt;

use crate::domain::{Domain, ListenEvent};

/// Callback invoked for every event delivered to a subscribed domain.
///
/// Listeners are held as `Arc<dyn RemoteEventListener>` and identified by
/// pointer, so the same handle must be passed to remove one.
pub trait RemoteEventListener: fmt::Debug + Send + Sync {
    /// Handles one delivered event.
    fn apply(&self, event: &ListenEvent);

    /// Called when the server forgot this client and its subscription to
    /// `domain` was dropped locally. Does nothing by default.
    fn on_unlisten(&self, domain: &Domain) {
        let _ = domain;
    }
}
