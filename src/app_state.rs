//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::registry::ListenerRegistry;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Listener registry backing every client and publish endpoint.
    pub registry: Arc<ListenerRegistry>,
}

impl AppState {
    /// Wraps `registry` for the router.
    #[must_use]
    pub const fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self { registry }
    }
}
