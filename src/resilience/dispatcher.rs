//! Background replay of queued operations.
//!
//! # Responsibilities
//! - Periodically drain due tasks from the retry queue
//! - Replay each one through the same outbound request path the sagas use
//! - Reschedule failures, discard tasks whose attempt budget is spent

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time;

use crate::observability::metrics;
use crate::resilience::retry_queue::{due_after, RetryQueue, RetryTask};
use crate::resilience::RetryPolicy;
use crate::services::client::UpstreamError;
use crate::services::outbound::OutboundRequest;

/// Per-tick summary, mostly useful to tests and debug logs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub completed: usize,
    pub rescheduled: usize,
    pub discarded: usize,
}

impl TickReport {
    pub fn processed(&self) -> usize {
        self.completed + self.rescheduled + self.discarded
    }
}

pub struct RetryDispatcher {
    queue: Arc<RetryQueue>,
    client: reqwest::Client,
    policy: RetryPolicy,
    tick: Duration,
}

impl RetryDispatcher {
    pub fn new(queue: Arc<RetryQueue>, client: reqwest::Client, policy: RetryPolicy, tick: Duration) -> Self {
        Self {
            queue,
            client,
            policy,
            tick,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            tick_secs = self.tick.as_secs(),
            max_attempts = self.policy.max_attempts,
            pending = self.queue.size(),
            "Retry dispatcher starting"
        );

        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.drain_due().await;
                    if report.processed() > 0 {
                        tracing::debug!(
                            completed = report.completed,
                            rescheduled = report.rescheduled,
                            discarded = report.discarded,
                            "Retry tick finished"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!(pending = self.queue.size(), "Retry dispatcher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Process every task due right now.
    pub async fn drain_due(&self) -> TickReport {
        self.drain_until(Utc::now()).await
    }

    /// Process tasks due at or before `cutoff`, one at a time.
    ///
    /// Tasks rescheduled past `cutoff` wait for a later call.
    pub async fn drain_until(&self, cutoff: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        while let Some(mut task) = self.queue.dequeue_due(cutoff) {
            tracing::info!(
                task_id = %task.id,
                kind = %task.kind,
                attempt = task.attempt + 1,
                max_attempts = task.max_attempts,
                "Retrying queued request"
            );

            match self.attempt(&task).await {
                Ok(()) => {
                    tracing::info!(task_id = %task.id, kind = %task.kind, "Queued request completed");
                    metrics::record_retry_attempt("success");
                    report.completed += 1;
                }
                Err(e) if task.has_attempts_left() => {
                    metrics::record_retry_attempt("failure");
                    let delay = self.policy.delay_for(task.attempt + 1);
                    task.attempt += 1;
                    task.not_before = due_after(Utc::now(), delay);
                    tracing::warn!(
                        task_id = %task.id,
                        kind = %task.kind,
                        error = %e,
                        next_attempt_at = %task.not_before,
                        "Queued request failed, rescheduling"
                    );
                    self.queue.enqueue(task);
                    report.rescheduled += 1;
                }
                Err(e) => {
                    metrics::record_retry_attempt("failure");
                    metrics::record_retry_discarded();
                    tracing::warn!(
                        task_id = %task.id,
                        kind = %task.kind,
                        method = %task.method,
                        target = %task.target_url,
                        error = %e,
                        "Retry attempts exhausted, discarding queued request"
                    );
                    report.discarded += 1;
                }
            }
        }

        report
    }

    async fn attempt(&self, task: &RetryTask) -> Result<(), UpstreamError> {
        let request = OutboundRequest::try_from(task)?;
        let response = request.send(&self.client).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.bytes().await.unwrap_or_default();
        Err(UpstreamError::Status {
            url: task.target_url.clone(),
            status,
            body,
        })
    }
}
