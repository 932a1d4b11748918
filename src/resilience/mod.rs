//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Read path:
//!     → circuit_breaker.rs (deny fast while a dependency is failing)
//!     → caller substitutes a default on denial or failure
//!
//! Write path (saga step failed after a committed step):
//!     → retry_queue.rs (park the compensating/replayed request)
//!     → dispatcher.rs (replay on a tick, spaced by backoff.rs)
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency, shared by every request
//! - Queued work is plain HTTP, replayed without knowing its saga
//! - Delivery is at-least-once for the life of the process

pub mod backoff;
pub mod circuit_breaker;
pub mod dispatcher;
pub mod retry_queue;

use std::sync::Arc;

use crate::config::CircuitBreakerConfig;

pub use backoff::RetryPolicy;
pub use circuit_breaker::{BreakerError, BreakerSettings, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use dispatcher::{RetryDispatcher, TickReport};
pub use retry_queue::{RetryQueue, RetryTask, TaskKind};

/// The three dependency breakers.
#[derive(Clone)]
pub struct Breakers {
    pub catalog: Arc<CircuitBreaker>,
    pub reputation: Arc<CircuitBreaker>,
    pub ledger: Arc<CircuitBreaker>,
}

impl Breakers {
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        let settings = BreakerSettings::from(config);
        Self {
            catalog: Arc::new(CircuitBreaker::new("catalog", settings)),
            reputation: Arc::new(CircuitBreaker::new("reputation", settings)),
            ledger: Arc::new(CircuitBreaker::new("ledger", settings)),
        }
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        vec![
            self.catalog.snapshot(),
            self.reputation.snapshot(),
            self.ledger.snapshot(),
        ]
    }
}
