//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` sits at the
//! root. With the `swagger-ui` feature the OpenAPI document is served at
//! `/api-docs/openapi.json` and browsable under `/swagger-ui`.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of every endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "longpoll-gateway",
        description = "Domain-scoped long-polling event service"
    ),
    paths(
        handlers::system::health_handler,
        handlers::clients::create_client,
        handlers::clients::register_listener,
        handlers::clients::unlisten,
        handlers::clients::set_event_filter,
        handlers::clients::remove_event_filter,
        handlers::clients::listen,
        handlers::clients::publish_user_event,
        handlers::domains::publish_event,
    ),
    components(schemas(
        dto::ClientResponse,
        dto::RegisterRequest,
        dto::RegisterResponse,
        dto::UnlistenRequest,
        dto::FilterRequest,
        dto::FilterResponse,
        dto::PublishEventRequest,
        dto::PublishEventResponse,
        dto::ListenResponse,
        handlers::system::HealthResponse,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "System", description = "Service status"),
        (name = "Clients", description = "Registration, filters and long-poll listen"),
        (name = "Domains", description = "Publishing to domains"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
