//! Library edge gateway.
//!
//! Fronts the catalog, reputation and ledger services: reads are composed
//! behind per-dependency circuit breakers with default fallbacks, and the
//! reservation and return workflows run as sagas whose partial failures are
//! parked in a retry queue and replayed in the background.

pub mod admin;
pub mod aggregation;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod saga;
pub mod services;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
