//! Catalog service client: libraries, books and availability counts.

use reqwest::Method;

use crate::services::client::{RawResponse, ServiceEndpoint, UpstreamError};
use crate::services::outbound::OutboundRequest;
use crate::services::types::{BookInfo, LibraryInfo};

#[derive(Debug, Clone)]
pub struct CatalogClient {
    endpoint: ServiceEndpoint,
}

impl CatalogClient {
    pub fn new(endpoint: ServiceEndpoint) -> Self {
        Self { endpoint }
    }

    pub async fn libraries(&self, query: Option<&str>) -> Result<RawResponse, UpstreamError> {
        let url = self.endpoint.url_with_query(&["api", "v1", "libraries"], query)?;
        self.endpoint.passthrough(&OutboundRequest::new(Method::GET, url)).await
    }

    pub async fn library_books(&self, library_uid: &str, query: Option<&str>) -> Result<RawResponse, UpstreamError> {
        let url = self
            .endpoint
            .url_with_query(&["api", "v1", "libraries", library_uid, "books"], query)?;
        self.endpoint.passthrough(&OutboundRequest::new(Method::GET, url)).await
    }

    pub async fn library(&self, library_uid: &str) -> Result<Option<LibraryInfo>, UpstreamError> {
        let url = self.endpoint.url(&["api", "v1", "libraries", library_uid])?;
        self.endpoint.fetch_optional(&OutboundRequest::new(Method::GET, url)).await
    }

    pub async fn book(&self, library_uid: &str, book_uid: &str) -> Result<Option<BookInfo>, UpstreamError> {
        let url = self
            .endpoint
            .url(&["api", "v1", "libraries", library_uid, "books", book_uid])?;
        self.endpoint.fetch_optional(&OutboundRequest::new(Method::GET, url)).await
    }

    /// Take one copy out of circulation. Expects 200.
    pub fn decrease_request(&self, library_uid: &str, book_uid: &str) -> Result<OutboundRequest, UpstreamError> {
        self.count_request(library_uid, book_uid, "decrease")
    }

    /// Put one copy back into circulation. Expects 200.
    pub fn increase_request(&self, library_uid: &str, book_uid: &str) -> Result<OutboundRequest, UpstreamError> {
        self.count_request(library_uid, book_uid, "increase")
    }

    fn count_request(&self, library_uid: &str, book_uid: &str, action: &str) -> Result<OutboundRequest, UpstreamError> {
        let url = self
            .endpoint
            .url(&["api", "v1", "libraries", library_uid, "books", book_uid, action])?;
        Ok(OutboundRequest::new(Method::POST, url))
    }
}
