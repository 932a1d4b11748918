//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Base URLs of the three collaborator services.
    pub services: ServicesConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Per-dependency circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry queue and dispatcher settings.
    pub retry: RetryConfig,

    /// Saga behaviour switches.
    pub sagas: SagaConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Collaborator service locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Catalog service (libraries, books, availability).
    pub catalog_url: String,

    /// Reputation service (user star rating).
    pub reputation_url: String,

    /// Ledger service (reservations).
    pub ledger_url: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            catalog_url: "http://localhost:8060".to_string(),
            reputation_url: "http://localhost:8050".to_string(),
            ledger_url: "http://localhost:8070".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Shared timeout for every outbound call, in seconds.
    pub upstream_secs: u64,

    /// Total time allowed for an inbound request, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upstream_secs: 10,
            request_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn upstream(&self) -> Duration {
        Duration::from_secs(self.upstream_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

/// Circuit breaker configuration, applied to each dependency.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures inside the window that trip the breaker.
    pub max_failures: u32,

    /// Sliding failure window in seconds.
    pub window_secs: u64,

    /// Cool-down before a half-open trial, in seconds.
    pub open_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            window_secs: 60,
            open_timeout_secs: 30,
        }
    }
}

/// How the dispatcher spaces out repeated attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay after every failure.
    Fixed,
    /// Doubling delay with jitter, capped at `max_delay_secs`.
    Exponential,
}

/// Retry queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Dispatcher tick interval in seconds.
    pub tick_secs: u64,

    /// Delay before a queued task becomes due, in seconds.
    pub delay_secs: u64,

    /// Attempts before a task is discarded.
    pub max_attempts: u32,

    /// Backoff strategy between attempts.
    pub backoff: BackoffStrategy,

    /// Upper bound for exponential backoff, in seconds.
    pub max_delay_secs: u64,

    /// Optional JSON snapshot file for the queue.
    pub persistence_path: Option<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            tick_secs: 5,
            delay_secs: 10,
            max_attempts: 5,
            backoff: BackoffStrategy::Fixed,
            max_delay_secs: 300,
            persistence_path: None,
        }
    }
}

/// Saga behaviour switches.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SagaConfig {
    /// Send an `Idempotency-Key` header on create/return calls and their replays.
    pub idempotency_keys: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

pub const PLACEHOLDER_ADMIN_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_ADMIN_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Override selected fields from the process environment.
    ///
    /// `LIBRARY_SERVICE_URL` is accepted as an alias of `CATALOG_SERVICE_URL`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = get("CATALOG_SERVICE_URL").or_else(|| get("LIBRARY_SERVICE_URL")) {
            self.services.catalog_url = url;
        }
        if let Some(url) = get("RATING_SERVICE_URL") {
            self.services.reputation_url = url;
        }
        if let Some(url) = get("RESERVATION_SERVICE_URL") {
            self.services.ledger_url = url;
        }
        if let Some(addr) = get("GATEWAY_BIND_ADDRESS") {
            self.listener.bind_address = addr;
        }
    }
}
