//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast (fallback if provided)
//! - Half-Open: one trial call decides whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures inside the sliding window >= max_failures
//! Open → Half-Open: lazily, on the first call after open_timeout
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency, constructed once and injected (no globals)
//! - The mutex guards state transitions only; the remote call runs unlocked,
//!   so concurrent callers are not serialized behind a slow dependency
//! - Single trial in Half-Open; concurrent callers are denied until it resolves
//! - A denied call never touches failure state, even when its fallback errors

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state as reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Thresholds for a single breaker.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub max_failures: u32,
    pub window: Duration,
    pub open_timeout: Duration,
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            max_failures: config.max_failures,
            window: Duration::from_secs(config.window_secs),
            open_timeout: Duration::from_secs(config.open_timeout_secs),
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker denied the call without contacting the dependency.
    #[error("circuit breaker '{0}' is open")]
    Open(String),

    /// The operation ran and failed.
    #[error("{0}")]
    Inner(E),
}

/// Point-in-time view of a breaker, for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub dependency: String,
    pub state: CircuitState,
    pub failures_in_window: usize,
    pub max_failures: u32,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: VecDeque<Instant>,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Pass,
    Trial,
    Denied,
}

/// Guards one outbound dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.lock();
        prune(&mut inner.failures, Instant::now(), self.settings.window);
        BreakerSnapshot {
            dependency: self.name.clone(),
            state: inner.state,
            failures_in_window: inner.failures.len(),
            max_failures: self.settings.max_failures,
        }
    }

    /// Run `operation` if the breaker admits it.
    ///
    /// A denied call returns [`BreakerError::Open`] without invoking `operation`.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_classified(operation, |_| true).await
    }

    /// Like [`CircuitBreaker::execute`], counting only errors for which
    /// `is_failure` holds. Other errors are returned but treated as successes.
    pub async fn execute_classified<T, E, F, Fut, C>(
        &self,
        operation: F,
        is_failure: C,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> bool,
    {
        let admission = self.admit();
        if admission == Admission::Denied {
            metrics::record_breaker_rejection(&self.name);
            tracing::debug!(dependency = %self.name, "Circuit open, call denied");
            return Err(BreakerError::Open(self.name.clone()));
        }

        let mut trial = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };
        let result = operation().await;
        trial.armed = false;

        match &result {
            Err(e) if is_failure(e) => self.on_failure(admission),
            _ => self.on_success(admission),
        }
        result.map_err(BreakerError::Inner)
    }

    /// Run `operation`, or `fallback` instead when the breaker denies the call.
    ///
    /// The fallback's outcome is returned as-is and never counted as a failure.
    /// Failures of `operation` itself still propagate to the caller.
    pub async fn execute_or_else<T, E, F, Fut, Fb>(&self, operation: F, fallback: Fb) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Fb: FnOnce() -> Result<T, E>,
    {
        match self.execute(operation).await {
            Ok(value) => Ok(value),
            Err(BreakerError::Inner(e)) => Err(e),
            Err(BreakerError::Open(_)) => fallback(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Admission {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Admission::Pass,
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure
                    .map_or(true, |t| t.elapsed() >= self.settings.open_timeout);
                if !cooled_down {
                    return Admission::Denied;
                }
                inner.state = CircuitState::HalfOpen;
                inner.failures.clear();
                inner.trial_in_flight = true;
                self.log_transition(CircuitState::HalfOpen);
                Admission::Trial
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Admission::Denied
                } else {
                    inner.trial_in_flight = true;
                    Admission::Trial
                }
            }
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.lock();
        if admission == Admission::Trial {
            inner.trial_in_flight = false;
            inner.failures.clear();
            if inner.state != CircuitState::Closed {
                inner.state = CircuitState::Closed;
                self.log_transition(CircuitState::Closed);
            }
            return;
        }
        // Only age out old entries; a success does not forgive recent failures.
        prune(&mut inner.failures, Instant::now(), self.settings.window);
    }

    fn on_failure(&self, admission: Admission) {
        let now = Instant::now();
        let mut inner = self.lock();
        if admission == Admission::Trial {
            inner.trial_in_flight = false;
        }

        inner.failures.push_back(now);
        inner.last_failure = Some(now);
        prune(&mut inner.failures, now, self.settings.window);

        let trips = admission == Admission::Trial
            || inner.state == CircuitState::HalfOpen
            || inner.failures.len() >= self.settings.max_failures as usize;

        if trips && inner.state != CircuitState::Open {
            inner.state = CircuitState::Open;
            tracing::warn!(
                dependency = %self.name,
                failures = inner.failures.len(),
                open_timeout = ?self.settings.open_timeout,
                "Circuit breaker opened"
            );
            metrics::record_breaker_transition(&self.name, "OPEN");
        }
    }

    fn log_transition(&self, to: CircuitState) {
        tracing::info!(dependency = %self.name, state = %to, "Circuit breaker state change");
        metrics::record_breaker_transition(&self.name, &to.to_string());
    }
}

fn prune(failures: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = failures.front() {
        if now.saturating_duration_since(oldest) > window {
            failures.pop_front();
        } else {
            break;
        }
    }
}

/// Releases the half-open trial slot if the trial future is dropped mid-call.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn breaker(max_failures: u32, window_ms: u64, open_timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "catalog",
            BreakerSettings {
                max_failures,
                window: Duration::from_millis(window_ms),
                open_timeout: Duration::from_millis(open_timeout_ms),
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) {
        let _ = cb.execute(|| async { Err::<(), _>("boom") }).await;
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
        cb.execute(|| async { Ok(1) }).await
    }

    #[tokio::test]
    async fn test_opens_at_max_failures() {
        let cb = breaker(3, 60_000, 60_000);
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        let calls = AtomicU32::new(0);
        let result = cb
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open(ref name)) if name == "catalog"));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "open breaker must not call through");
    }

    #[tokio::test]
    async fn test_failures_outside_window_do_not_count() {
        let cb = breaker(3, 50, 60_000);
        fail(&cb).await;
        fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().failures_in_window, 1);
    }

    #[tokio::test]
    async fn test_success_while_closed_only_prunes() {
        let cb = breaker(3, 60_000, 60_000);
        fail(&cb).await;
        fail(&cb).await;
        assert!(succeed(&cb).await.is_ok());
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_half_open_success_closes() {
        let cb = breaker(1, 60_000, 40);
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open(_))));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(succeed(&cb).await.unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().failures_in_window, 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(2, 60_000, 40);
        fail(&cb).await;
        fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        // A single failed trial is enough, regardless of max_failures.
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open(_))));
    }

    #[tokio::test]
    async fn test_fallback_runs_when_open_and_is_not_counted() {
        let cb = breaker(1, 60_000, 60_000);
        fail(&cb).await;
        let before = cb.snapshot().failures_in_window;

        let value = cb
            .execute_or_else(|| async { Ok::<_, &str>(1) }, || Ok(0))
            .await
            .unwrap();
        assert_eq!(value, 0);

        let err = cb
            .execute_or_else(|| async { Ok::<u32, _>(1) }, || Err("fallback failed"))
            .await
            .unwrap_err();
        assert_eq!(err, "fallback failed");
        assert_eq!(cb.snapshot().failures_in_window, before);
    }

    #[tokio::test]
    async fn test_operation_failure_propagates_through_fallback_variant() {
        let cb = breaker(5, 60_000, 60_000);
        let err = cb
            .execute_or_else(|| async { Err::<u32, _>("upstream down") }, || Ok(0))
            .await
            .unwrap_err();
        assert_eq!(err, "upstream down");
        assert_eq!(cb.snapshot().failures_in_window, 1);
    }

    #[tokio::test]
    async fn test_half_open_admits_single_trial() {
        let cb = Arc::new(breaker(1, 60_000, 20));
        fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let trial_cb = cb.clone();
        let trial = tokio::spawn(async move {
            trial_cb
                .execute(|| async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok::<_, &str>("trial")
                })
                .await
        });

        started_rx.await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let concurrent = cb
            .execute_or_else(|| async { Ok::<_, &str>("through") }, || Ok("fallback"))
            .await
            .unwrap();
        assert_eq!(concurrent, "fallback");

        release_tx.send(()).unwrap();
        assert_eq!(trial.await.unwrap().unwrap(), "trial");
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_dropped_trial_frees_slot() {
        let cb = breaker(1, 60_000, 20);
        fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            cb.execute(|| std::future::pending::<Result<(), &str>>()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        assert_eq!(succeed(&cb).await.unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_unclassified_errors_are_not_failures() {
        let cb = breaker(1, 60_000, 60_000);
        let result = cb
            .execute_classified(|| async { Err::<(), _>(404) }, |status| *status >= 500)
            .await;
        assert!(matches!(result, Err(BreakerError::Inner(404))));
        assert_eq!(cb.state(), CircuitState::Closed);

        let _ = cb
            .execute_classified(|| async { Err::<(), _>(503) }, |status| *status >= 500)
            .await;
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
