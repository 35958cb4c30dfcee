//! longpoll-gateway server entry point.
//!
//! Starts the Axum HTTP server and the idle-eviction sweep.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use longpoll_gateway::api;
use longpoll_gateway::app_state::AppState;
use longpoll_gateway::config::EventServiceConfig;
use longpoll_gateway::registry::{EvictionTask, ListenerRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = EventServiceConfig::from_env().context("loading configuration")?;
    tracing::info!(addr = %config.listen_addr, "starting longpoll-gateway");

    // Build registry and its eviction sweep
    let registry = Arc::new(ListenerRegistry::new(config.waiting_times));
    let eviction = EvictionTask::for_registry(&registry, config.eviction_interval).spawn();

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState::new(registry));

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    eviction.abort();
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
