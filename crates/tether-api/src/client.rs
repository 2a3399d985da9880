//! HTTP client for a remote discovery registry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use tether_core::{NodeId, SignedEntry, TransportId};
use tether_services::{DiscoveryClient, DiscoveryError, EntryWithStatus, Status};

use crate::handlers::{
    EdgeResponse, ErrorBody, ErrorKind, HealthResponse, RegisterRequest, StatusRequest,
    StatusResponse,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `DiscoveryClient` backed by a registry served by `tether_api::serve`.
#[derive(Clone)]
pub struct HttpDiscovery {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDiscovery {
    /// `base_url` includes the `/api` prefix, e.g. "http://10.0.0.1:7401/api".
    pub fn new(base_url: &str) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DiscoveryError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn health(&self) -> Result<HealthResponse, DiscoveryError> {
        let resp = self.send(self.client.get(self.url("/health"))).await?;
        decode(resp, None).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Response, DiscoveryError> {
        req.send().await.map_err(|e| {
            DiscoveryError::Unavailable(format!("registry at {} unreachable: {}", self.base_url, e))
        })
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Response, DiscoveryError> {
        self.send(self.client.post(self.url(path)).json(body)).await
    }
}

/// Turn a response into `T`, or into the `DiscoveryError` its body describes.
/// `requested` fills in the id when the server did not echo one.
async fn decode<T: DeserializeOwned>(
    resp: Response,
    requested: Option<TransportId>,
) -> Result<T, DiscoveryError> {
    let status = resp.status();
    if status.is_success() {
        return resp
            .json::<T>()
            .await
            .map_err(|e| DiscoveryError::Unavailable(format!("failed to parse response: {}", e)));
    }

    let text = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorBody>(&text).ok();
    let id = body.as_ref().and_then(|b| b.id).or(requested);
    let message = body.as_ref().map(|b| b.error.clone()).unwrap_or(text);

    let kind = body.map(|b| b.kind);
    Err(match (kind, status, id) {
        (Some(ErrorKind::NotFound), _, Some(id)) | (None, StatusCode::NOT_FOUND, Some(id)) => {
            DiscoveryError::NotFound(id)
        }
        (Some(ErrorKind::AlreadyRegistered), _, Some(id))
        | (None, StatusCode::CONFLICT, Some(id)) => DiscoveryError::AlreadyRegistered(id),
        (Some(ErrorKind::InvalidEntry | ErrorKind::BadRequest), _, _) => {
            DiscoveryError::InvalidEntry(message)
        }
        (None, s, _) if s.is_client_error() => DiscoveryError::InvalidEntry(message),
        _ => DiscoveryError::Unavailable(format!("registry returned {}: {}", status, message)),
    })
}

#[async_trait]
impl DiscoveryClient for HttpDiscovery {
    async fn register_transports(&self, entries: &[SignedEntry]) -> Result<(), DiscoveryError> {
        let body = RegisterRequest {
            entries: entries.to_vec(),
        };
        let resp = self.post("/transports", &body).await?;
        let _: serde_json::Value = decode(resp, None).await?;
        tracing::debug!(count = entries.len(), registry = %self.base_url, "registered transports");
        Ok(())
    }

    async fn update_statuses(
        &self,
        statuses: &[Status],
    ) -> Result<Vec<EntryWithStatus>, DiscoveryError> {
        let body = StatusRequest {
            statuses: statuses.to_vec(),
        };
        let resp = self.post("/statuses", &body).await?;
        let first = statuses.first().map(|s| s.id);
        let updated: StatusResponse = decode(resp, first).await?;
        Ok(updated.updated)
    }

    async fn get_transport_by_id(&self, id: TransportId) -> Result<EntryWithStatus, DiscoveryError> {
        let url = self.url(&format!("/transports/id/{}", id));
        let resp = self.send(self.client.get(url)).await?;
        decode(resp, Some(id)).await
    }

    async fn get_transports_by_edge(
        &self,
        node: NodeId,
    ) -> Result<Vec<EntryWithStatus>, DiscoveryError> {
        let url = self.url(&format!("/transports/edge/{}", node));
        let resp = self.send(self.client.get(url)).await?;
        let found: EdgeResponse = decode(resp, None).await?;
        Ok(found.transports)
    }
}
