//! HTTP-shaped outbound operations.
//!
//! An [`OutboundRequest`] is the unit both the sagas and the retry dispatcher
//! execute: the saga sends it once, and on a detected partial failure the very
//! same value is converted into a [`RetryTask`] and replayed later.

use std::collections::BTreeMap;

use axum::body::Bytes;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use url::Url;

use crate::resilience::retry_queue::{RetryTask, TaskKind};
use crate::resilience::RetryPolicy;
use crate::services::client::UpstreamError;

pub const IDEMPOTENCY_KEY: &str = "Idempotency-Key";
pub const USER_HEADER: &str = "X-User-Name";

/// Method, target, headers and optional body of one remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl OutboundRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    pub fn user(self, username: &str) -> Self {
        self.header(USER_HEADER, username)
    }

    /// Attach `key` as the idempotency key, when one is in use.
    pub fn idempotency_key(self, key: Option<&str>) -> Self {
        match key {
            Some(key) => self.header(IDEMPOTENCY_KEY, key),
            None => self,
        }
    }

    pub fn json<T: Serialize>(mut self, payload: &T) -> Result<Self, UpstreamError> {
        let body = serde_json::to_vec(payload).map_err(UpstreamError::Encode)?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self.body = Some(body);
        Ok(self)
    }

    /// Send the request; any HTTP status counts as a delivered response.
    pub async fn send(&self, client: &reqwest::Client) -> Result<reqwest::Response, UpstreamError> {
        let mut builder = client.request(self.method.clone(), self.url.clone());
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }
        builder.send().await.map_err(|source| UpstreamError::Transport {
            url: self.url.to_string(),
            source,
        })
    }

    /// Send the request and require `expected` back.
    pub async fn send_expecting(
        &self,
        client: &reqwest::Client,
        expected: StatusCode,
    ) -> Result<reqwest::Response, UpstreamError> {
        let response = self.send(client).await?;
        if response.status() == expected {
            return Ok(response);
        }
        let status = response.status();
        let body = response.bytes().await.unwrap_or_default();
        Err(UpstreamError::Status {
            url: self.url.to_string(),
            status,
            body: Bytes::from(body),
        })
    }

    /// Freeze this request into a queued task due after the first delay.
    pub fn into_task(self, kind: TaskKind, policy: &RetryPolicy) -> RetryTask {
        RetryTask::new(
            kind,
            self.method.as_str(),
            self.url.as_str(),
            self.headers,
            self.body,
            policy.delay_for(0),
            policy.max_attempts,
        )
    }
}

impl TryFrom<&RetryTask> for OutboundRequest {
    type Error = UpstreamError;

    fn try_from(task: &RetryTask) -> Result<Self, Self::Error> {
        let method = Method::from_bytes(task.method.as_bytes())
            .map_err(|_| UpstreamError::InvalidTask(format!("unknown method '{}'", task.method)))?;
        let url = Url::parse(&task.target_url)?;
        Ok(Self {
            method,
            url,
            headers: task.headers.clone(),
            body: task.body.clone(),
        })
    }
}
