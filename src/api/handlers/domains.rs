//! Domain publishing handler.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{PublishEventRequest, PublishEventResponse};
use crate::app_state::AppState;
use crate::domain::Domain;

/// `POST /domains/{domain}/events`: Publish an event to a domain.
#[utoipa::path(
    post,
    path = "/api/v1/domains/{domain}/events",
    tag = "Domains",
    summary = "Publish a domain event",
    description = "Enqueues the event for every client subscribed to the domain whose filter accepts it, and wakes their pending listens.",
    params(
        ("domain" = String, Path, description = "Domain name"),
    ),
    request_body = PublishEventRequest,
    responses(
        (status = 202, description = "Event accepted", body = PublishEventResponse),
    )
)]
pub async fn publish_event(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Json(req): Json<PublishEventRequest>,
) -> impl IntoResponse {
    let delivered = state
        .registry
        .add_event(&Domain::from(domain), req.into_event())
        .await;
    (
        StatusCode::ACCEPTED,
        Json(PublishEventResponse { delivered }),
    )
}

/// Domain routes, relative to `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/domains/{domain}/events", post(publish_event))
}
