//! Reputation service client: user star ratings.

use reqwest::{Method, StatusCode};

use crate::services::client::{RawResponse, ServiceEndpoint, UpstreamError};
use crate::services::outbound::OutboundRequest;
use crate::services::types::{RatingAdjustment, RatingInfo};

#[derive(Debug, Clone)]
pub struct ReputationClient {
    endpoint: ServiceEndpoint,
}

impl ReputationClient {
    pub fn new(endpoint: ServiceEndpoint) -> Self {
        Self { endpoint }
    }

    fn rating_request(&self, username: &str) -> Result<OutboundRequest, UpstreamError> {
        let url = self.endpoint.url(&["api", "v1", "rating"])?;
        Ok(OutboundRequest::new(Method::GET, url).user(username))
    }

    pub async fn rating(&self, username: &str) -> Result<RatingInfo, UpstreamError> {
        self.endpoint.fetch(&self.rating_request(username)?).await
    }

    pub async fn rating_raw(&self, username: &str) -> Result<RawResponse, UpstreamError> {
        self.endpoint.passthrough(&self.rating_request(username)?).await
    }

    /// Apply a signed star delta. Not retried on failure.
    pub async fn adjust(&self, username: &str, delta: i32) -> Result<(), UpstreamError> {
        let url = self.endpoint.url(&["api", "v1", "rating", "adjust"])?;
        let request = OutboundRequest::new(Method::POST, url).json(&RatingAdjustment {
            username: username.to_string(),
            delta,
        })?;
        request.send_expecting(self.endpoint.client(), StatusCode::OK).await?;
        Ok(())
    }
}
