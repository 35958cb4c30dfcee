//! Event publishing and listen DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Event, ListenEvent};

/// Body of the publish endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublishEventRequest {
    /// Monotonically increasing id, if the producer stamps one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<u64>,
    /// Opaque event payload.
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

impl PublishEventRequest {
    /// Converts the request into the event to publish.
    #[must_use]
    pub fn into_event(self) -> Event {
        match self.unique_id {
            Some(id) => Event::with_unique_id(id, self.payload),
            None => Event::new(self.payload),
        }
    }
}

/// Response of the publish endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublishEventResponse {
    /// Number of recipients the event was enqueued for.
    pub delivered: usize,
}

/// Response of the long-poll endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ListenResponse {
    /// Pending events in enqueue order; empty when the wait timed out.
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<ListenEvent>,
}
