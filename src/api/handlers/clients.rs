//! Client handlers: registration, filters, long-poll listen and
//! user-specific publishing.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::api::dto::{
    ClientResponse, FilterRequest, FilterResponse, ListenResponse, PublishEventRequest,
    PublishEventResponse, RegisterRequest, RegisterResponse, UnlistenRequest,
};
use crate::app_state::AppState;
use crate::domain::{Domain, EventFilter, FilterSpec, UserId};
use crate::error::{ErrorResponse, EventServiceError};

fn checked_filter(filter: FilterSpec) -> Result<Arc<dyn EventFilter>, EventServiceError> {
    filter
        .validate()
        .map_err(EventServiceError::InvalidRequest)?;
    Ok(Arc::new(filter))
}

/// `POST /clients`: Mint an anonymous client identity.
#[utoipa::path(
    post,
    path = "/api/v1/clients",
    tag = "Clients",
    summary = "Create a client identity",
    description = "Returns a fresh anonymous user id. The client is only known to the registry once it registers a domain.",
    responses(
        (status = 201, description = "Identity created", body = ClientResponse),
    )
)]
pub async fn create_client() -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(ClientResponse {
            user_id: UserId::anonymous(),
        }),
    )
}

/// `POST /clients/{user}/domains/{domain}`: Subscribe to a domain.
///
/// # Errors
///
/// Returns [`EventServiceError::InvalidRequest`] for a malformed filter.
#[utoipa::path(
    post,
    path = "/api/v1/clients/{user}/domains/{domain}",
    tag = "Clients",
    summary = "Register a listener",
    description = "Subscribes the client to the domain, creating its registration on first use. A filter in the body replaces the current one.",
    params(
        ("user" = String, Path, description = "Client user id"),
        ("domain" = String, Path, description = "Domain name"),
    ),
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registered", body = RegisterResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
    )
)]
pub async fn register_listener(
    State(state): State<AppState>,
    Path((user, domain)): Path<(String, String)>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, EventServiceError> {
    let user_id = UserId::from(user);
    let domain = Domain::from(domain);
    let filter = req.filter.map(checked_filter).transpose()?;

    state
        .registry
        .register_listener(&user_id, &domain, filter)
        .await;

    let mut domains: Vec<Domain> = state
        .registry
        .listen_domains(&user_id)
        .await
        .into_iter()
        .collect();
    domains.sort();
    Ok(Json(RegisterResponse { user_id, domains }))
}

/// `POST /clients/{user}/unlisten`: Leave some or all domains.
#[utoipa::path(
    post,
    path = "/api/v1/clients/{user}/unlisten",
    tag = "Clients",
    summary = "Unregister listeners",
    description = "Unsubscribes the client from the listed domains, or from all of them when `domains` is null. Leaving the last domain drops the registration.",
    params(
        ("user" = String, Path, description = "Client user id"),
    ),
    request_body = UnlistenRequest,
    responses(
        (status = 204, description = "Unregistered"),
    )
)]
pub async fn unlisten(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<UnlistenRequest>,
) -> impl IntoResponse {
    let user_id = UserId::from(user);
    match req.domains {
        Some(domains) => {
            state
                .registry
                .unregister_listener_domains(&user_id, &domains)
                .await;
        }
        None => state.registry.unregister_listeners(&user_id).await,
    }
    StatusCode::NO_CONTENT
}

/// `PUT /clients/{user}/filters/{domain}`: Set an event filter.
///
/// # Errors
///
/// Returns [`EventServiceError::InvalidRequest`] for a malformed filter.
#[utoipa::path(
    put,
    path = "/api/v1/clients/{user}/filters/{domain}",
    tag = "Clients",
    summary = "Set an event filter",
    description = "Sets the filter applied to the domain's events for this client. Ignored for unknown clients.",
    params(
        ("user" = String, Path, description = "Client user id"),
        ("domain" = String, Path, description = "Domain name"),
    ),
    request_body = FilterRequest,
    responses(
        (status = 200, description = "Filter processed", body = FilterResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
    )
)]
pub async fn set_event_filter(
    State(state): State<AppState>,
    Path((user, domain)): Path<(String, String)>,
    Json(req): Json<FilterRequest>,
) -> Result<impl IntoResponse, EventServiceError> {
    let filter = checked_filter(req.filter)?;
    let applied = state
        .registry
        .set_event_filter(&UserId::from(user), &Domain::from(domain), filter)
        .await;
    Ok(Json(FilterResponse { applied }))
}

/// `DELETE /clients/{user}/filters/{domain}`: Remove an event filter.
#[utoipa::path(
    delete,
    path = "/api/v1/clients/{user}/filters/{domain}",
    tag = "Clients",
    summary = "Remove an event filter",
    params(
        ("user" = String, Path, description = "Client user id"),
        ("domain" = String, Path, description = "Domain name"),
    ),
    responses(
        (status = 200, description = "Filter processed", body = FilterResponse),
    )
)]
pub async fn remove_event_filter(
    State(state): State<AppState>,
    Path((user, domain)): Path<(String, String)>,
) -> impl IntoResponse {
    let applied = state
        .registry
        .remove_event_filter(&UserId::from(user), &Domain::from(domain))
        .await;
    Json(FilterResponse { applied })
}

/// `GET /clients/{user}/events`: Long-poll for pending events.
///
/// # Errors
///
/// Returns [`EventServiceError::UninitializedClient`] if the client has no
/// registration.
#[utoipa::path(
    get,
    path = "/api/v1/clients/{user}/events",
    tag = "Clients",
    summary = "Listen for events",
    description = "Blocks until events are pending (respecting the minimum waiting time) or the maximum waiting time elapses, then returns the pending events.",
    params(
        ("user" = String, Path, description = "Client user id"),
    ),
    responses(
        (status = 200, description = "Pending events, possibly none", body = ListenResponse),
        (status = 404, description = "Client not registered", body = ErrorResponse),
    )
)]
pub async fn listen(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<impl IntoResponse, EventServiceError> {
    let events = state.registry.listen(&UserId::from(user)).await?;
    Ok(Json(ListenResponse { events }))
}

/// `POST /clients/{user}/events`: Publish a user-specific event.
#[utoipa::path(
    post,
    path = "/api/v1/clients/{user}/events",
    tag = "Clients",
    summary = "Publish a user-specific event",
    description = "Enqueues the event for this client only, bypassing domain filters. Dropped for unknown clients.",
    params(
        ("user" = String, Path, description = "Client user id"),
    ),
    request_body = PublishEventRequest,
    responses(
        (status = 202, description = "Event accepted", body = PublishEventResponse),
    )
)]
pub async fn publish_user_event(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<PublishEventRequest>,
) -> impl IntoResponse {
    let delivered = state
        .registry
        .add_event_user_specific(&UserId::from(user), req.into_event())
        .await;
    (
        StatusCode::ACCEPTED,
        Json(PublishEventResponse {
            delivered: usize::from(delivered),
        }),
    )
}

/// Client routes, relative to `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/clients", post(create_client))
        .route("/clients/{user}/domains/{domain}", post(register_listener))
        .route("/clients/{user}/unlisten", post(unlisten))
        .route(
            "/clients/{user}/filters/{domain}",
            put(set_event_filter).delete(remove_event_filter),
        )
        .route("/clients/{user}/events", get(listen).post(publish_user_event))
}
