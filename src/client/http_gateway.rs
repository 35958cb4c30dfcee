//! [`RemoteGateway`] over the service's REST API.

use reqwest::{Client, Response, Url};

use super::RemoteGateway;
use crate::api::dto::{FilterRequest, ListenResponse, RegisterRequest, UnlistenRequest};
use crate::domain::{Domain, FilterSpec, ListenEvent, UserId};
use crate::error::{ErrorResponse, RemoteCallError, UNINITIALIZED_CLIENT_CODE};

/// Talks to an event service at `base` (e.g. `http://localhost:3000/`).
///
/// An error answer carrying code [`UNINITIALIZED_CLIENT_CODE`] becomes
/// [`RemoteCallError::Uninitialized`]; any other error answer becomes
/// [`RemoteCallError::Rejected`].
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base: Url,
}

impl HttpGateway {
    /// Creates a gateway with a default HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteCallError::Transport`] if the HTTP client cannot be
    /// built.
    pub fn new(base: Url) -> Result<Self, RemoteCallError> {
        let client = Client::builder().build()?;
        Ok(Self::with_client(client, base))
    }

    /// Creates a gateway reusing an existing HTTP client.
    #[must_use]
    pub const fn with_client(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteCallError> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                RemoteCallError::Transport(format!("{} cannot be used as a base URL", self.base))
            })?;
            path.pop_if_empty().extend(["api", "v1"]).extend(segments);
        }
        Ok(url)
    }

    fn client_endpoint(&self, user_id: &UserId, rest: &[&str]) -> Result<Url, RemoteCallError> {
        let mut segments = vec!["clients", user_id.as_str()];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }
}

/// Passes successful responses through and maps error answers.
async fn check(response: Response) -> Result<Response, RemoteCallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match response.json::<ErrorResponse>().await {
        Ok(body) if body.error.code == UNINITIALIZED_CLIENT_CODE => Err(RemoteCallError::Uninitialized),
        Ok(body) => Err(RemoteCallError::Rejected {
            status: status.as_u16(),
            message: body.error.message,
        }),
        Err(_) => Err(RemoteCallError::Rejected {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("unknown").to_string(),
        }),
    }
}

impl RemoteGateway for HttpGateway {
    async fn register(
        &self,
        user_id: &UserId,
        domain: &Domain,
        filter: Option<&FilterSpec>,
    ) -> Result<(), RemoteCallError> {
        let url = self.client_endpoint(user_id, &["domains", domain.name()])?;
        let body = RegisterRequest {
            filter: filter.cloned(),
        };
        check(self.client.post(url).json(&body).send().await?).await?;
        Ok(())
    }

    async fn unlisten(&self, user_id: &UserId, domains: &[Domain]) -> Result<(), RemoteCallError> {
        let url = self.client_endpoint(user_id, &["unlisten"])?;
        let body = UnlistenRequest {
            domains: Some(domains.to_vec()),
        };
        check(self.client.post(url).json(&body).send().await?).await?;
        Ok(())
    }

    async fn listen(&self, user_id: &UserId) -> Result<Vec<ListenEvent>, RemoteCallError> {
        let url = self.client_endpoint(user_id, &["events"])?;
        let response = check(self.client.get(url).send().await?).await?;
        let body: ListenResponse = response.json().await?;
        Ok(body.events)
    }

    async fn register_event_filter(
        &self,
        user_id: &UserId,
        domain: &Domain,
        filter: &FilterSpec,
    ) -> Result<(), RemoteCallError> {
        let url = self.client_endpoint(user_id, &["filters", domain.name()])?;
        let body = FilterRequest {
            filter: filter.clone(),
        };
        check(self.client.put(url).json(&body).send().await?).await?;
        Ok(())
    }

    async fn deregister_event_filter(
        &self,
        user_id: &UserId,
        domain: &Domain,
    ) -> Result<(), RemoteCallError> {
        let url = self.client_endpoint(user_id, &["filters", domain.name()])?;
        check(self.client.delete(url).send().await?).await?;
        Ok(())
    }
}
