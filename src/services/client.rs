//! Shared plumbing for the collaborator clients.

use std::time::Duration;

use axum::body::Bytes;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::services::outbound::OutboundRequest;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode, body: Bytes },

    #[error("undecodable response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("base URL cannot carry a path: {0}")]
    InvalidBase(String),

    #[error("invalid queued task: {0}")]
    InvalidTask(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl UpstreamError {
    /// Whether this error says the dependency itself is unhealthy.
    ///
    /// Client errors (4xx) are the caller's problem and do not count.
    pub fn trips_breaker(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Decode { .. } => true,
            Self::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }

    /// The remote status, when the dependency answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Build the outbound client shared by every dependency and the dispatcher.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, UpstreamError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("library-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(UpstreamError::Client)
}

/// A dependency's status, content type and body, relayed verbatim.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            body: Bytes::from(value.to_string()),
        }
    }

    pub async fn read(response: reqwest::Response) -> Result<Self, UpstreamError> {
        let url = response.url().to_string();
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|source| UpstreamError::Decode { url, source })?;
        Ok(Self {
            status,
            content_type,
            body,
        })
    }
}

/// Base URL plus client for one dependency.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    client: reqwest::Client,
    base: Url,
}

impl ServiceEndpoint {
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, UpstreamError> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(UpstreamError::InvalidBase(base_url.to_string()));
        }
        Ok(Self { client, base })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Append percent-encoded path segments to the base URL.
    pub fn url(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamError::InvalidBase(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Like [`ServiceEndpoint::url`], with an optional raw query string.
    pub fn url_with_query(&self, segments: &[&str], query: Option<&str>) -> Result<Url, UpstreamError> {
        let mut url = self.url(segments)?;
        url.set_query(query.filter(|q| !q.is_empty()));
        Ok(url)
    }

    /// Relay a response as-is; only 5xx is reported as a failure.
    pub async fn passthrough(&self, request: &OutboundRequest) -> Result<RawResponse, UpstreamError> {
        let raw = RawResponse::read(request.send(&self.client).await?).await?;
        if raw.status.is_server_error() {
            return Err(UpstreamError::Status {
                url: request.url.to_string(),
                status: raw.status,
                body: raw.body,
            });
        }
        Ok(raw)
    }

    /// Decode a 200 body; 404 yields `None`, anything else is an error.
    pub async fn fetch_optional<T: DeserializeOwned>(
        &self,
        request: &OutboundRequest,
    ) -> Result<Option<T>, UpstreamError> {
        let response = request.send(&self.client).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                url: request.url.to_string(),
                status,
                body,
            });
        }
        decode(request, response).await.map(Some)
    }

    /// Decode a success body; any other status is an error.
    pub async fn fetch<T: DeserializeOwned>(&self, request: &OutboundRequest) -> Result<T, UpstreamError> {
        let response = request.send(&self.client).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                url: request.url.to_string(),
                status,
                body,
            });
        }
        decode(request, response).await
    }
}

async fn decode<T: DeserializeOwned>(request: &OutboundRequest, response: reqwest::Response) -> Result<T, UpstreamError> {
    response.json::<T>().await.map_err(|source| UpstreamError::Decode {
        url: request.url.to_string(),
        source,
    })
}
