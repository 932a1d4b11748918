//! Clients for the three collaborator services.
//!
//! # Data Flow
//! ```text
//! saga / aggregation
//!     → catalog.rs | reputation.rs | ledger.rs (typed operations)
//!     → outbound.rs (one HTTP-shaped request, replayable)
//!     → client.rs (shared reqwest client, URL building, status checks)
//! ```

pub mod catalog;
pub mod client;
pub mod ledger;
pub mod outbound;
pub mod reputation;
pub mod types;

use crate::config::{ServicesConfig, TimeoutConfig};

pub use catalog::CatalogClient;
pub use client::{build_http_client, RawResponse, ServiceEndpoint, UpstreamError};
pub use ledger::LedgerClient;
pub use outbound::OutboundRequest;
pub use reputation::ReputationClient;

/// All collaborator clients, sharing one connection pool.
#[derive(Debug, Clone)]
pub struct Services {
    pub http: reqwest::Client,
    pub catalog: CatalogClient,
    pub reputation: ReputationClient,
    pub ledger: LedgerClient,
}

impl Services {
    pub fn from_config(services: &ServicesConfig, timeouts: &TimeoutConfig) -> Result<Self, UpstreamError> {
        let http = build_http_client(timeouts.upstream())?;
        Ok(Self {
            catalog: CatalogClient::new(ServiceEndpoint::new(http.clone(), &services.catalog_url)?),
            reputation: ReputationClient::new(ServiceEndpoint::new(http.clone(), &services.reputation_url)?),
            ledger: LedgerClient::new(ServiceEndpoint::new(http.clone(), &services.ledger_url)?),
            http,
        })
    }
}
