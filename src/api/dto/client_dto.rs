//! Client registration DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Domain, FilterSpec, UserId};

/// Response of `POST /clients`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClientResponse {
    /// Freshly minted client identity.
    #[schema(value_type = String)]
    pub user_id: UserId,
}

/// Body of `POST /clients/{user}/domains/{domain}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Filter applied to events of the domain. Omit for none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub filter: Option<FilterSpec>,
}

/// Response of a successful registration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    /// Registered client.
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// All domains the client now listens to, sorted.
    #[schema(value_type = Vec<String>)]
    pub domains: Vec<Domain>,
}

/// Body of `POST /clients/{user}/unlisten`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UnlistenRequest {
    /// Domains to leave; `null` or absent leaves all of them.
    #[serde(default)]
    #[schema(value_type = Option<Vec<String>>)]
    pub domains: Option<Vec<Domain>>,
}

/// Body of `PUT /clients/{user}/filters/{domain}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FilterRequest {
    /// Filter to apply.
    #[schema(value_type = Object)]
    pub filter: FilterSpec,
}

/// Result of a filter change.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FilterResponse {
    /// Whether the registry changed; `false` for unknown clients or when
    /// there was no filter to remove.
    pub applied: bool,
}
