use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::resilience::{BreakerSnapshot, RetryTask};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub retry_queue_depth: usize,
}

#[derive(Serialize)]
pub struct RetryQueueView {
    pub size: usize,
    pub tasks: Vec<RetryTask>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        retry_queue_depth: state.queue.size(),
    })
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.breakers.snapshots())
}

pub async fn get_retry_queue(State(state): State<AppState>) -> Json<RetryQueueView> {
    let tasks = state.queue.get_all();
    Json(RetryQueueView {
        size: tasks.len(),
        tasks,
    })
}

/// The next due task, or `null` when nothing is due.
pub async fn peek_retry_queue(State(state): State<AppState>) -> Json<Option<RetryTask>> {
    Json(state.queue.peek())
}
