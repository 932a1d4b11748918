//! Time-ordered queue of deferred remote operations.
//!
//! Tasks are kept ordered by `not_before` (ties broken by id) and indexed by
//! id, so re-enqueueing an existing id replaces the old entry instead of
//! duplicating it. All operations take a short internal lock and never block
//! on I/O.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, IntoInnerError};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::observability::metrics;

/// Which saga step a queued task replays or compensates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    CreateReservation,
    RollbackReservation,
    ReturnBook,
    RollbackReturn,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateReservation => "create_reservation",
            Self::RollbackReservation => "rollback_reservation",
            Self::ReturnBook => "return_book",
            Self::RollbackReturn => "rollback_return",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote operation waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryTask {
    pub id: String,
    pub kind: TaskKind,
    pub method: String,
    pub target_url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, with = "body_text", skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
    pub not_before: DateTime<Utc>,
    pub attempt: u32,
    pub max_attempts: u32,
}

impl RetryTask {
    pub fn new(
        kind: TaskKind,
        method: &str,
        target_url: &str,
        headers: BTreeMap<String, String>,
        body: Option<Vec<u8>>,
        delay: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            method: method.to_string(),
            target_url: target_url.to_string(),
            headers,
            body,
            not_before: due_after(Utc::now(), delay),
            attempt: 0,
            max_attempts,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now
    }

    /// Whether another attempt is allowed after the current one failed.
    pub fn has_attempts_left(&self) -> bool {
        self.attempt + 1 < self.max_attempts
    }
}

pub(crate) fn due_after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Default)]
struct QueueState {
    by_due: BTreeMap<(DateTime<Utc>, String), RetryTask>,
    due_of: HashMap<String, DateTime<Utc>>,
}

impl QueueState {
    fn insert(&mut self, task: RetryTask) {
        if let Some(previous) = self.due_of.insert(task.id.clone(), task.not_before) {
            self.by_due.remove(&(previous, task.id.clone()));
        }
        self.by_due.insert((task.not_before, task.id.clone()), task);
    }

    fn pop_due(&mut self, now: DateTime<Utc>) -> Option<RetryTask> {
        let (key, _) = self.by_due.first_key_value()?;
        if key.0 > now {
            return None;
        }
        let (_, task) = self.by_due.pop_first()?;
        self.due_of.remove(&task.id);
        Some(task)
    }
}

/// Thread-safe retry queue shared by the sagas and the dispatcher.
#[derive(Default)]
pub struct RetryQueue {
    inner: Mutex<QueueState>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace a task.
    pub fn enqueue(&self, task: RetryTask) {
        debug!(
            task_id = %task.id,
            kind = %task.kind,
            attempt = task.attempt,
            not_before = %task.not_before,
            "Task enqueued"
        );
        let mut state = self.lock();
        state.insert(task);
        metrics::record_queue_depth(state.by_due.len());
    }

    /// Remove and return the earliest task that is due now.
    pub fn dequeue(&self) -> Option<RetryTask> {
        self.dequeue_due(Utc::now())
    }

    /// Remove and return the earliest task due at or before `now`.
    pub fn dequeue_due(&self, now: DateTime<Utc>) -> Option<RetryTask> {
        let mut state = self.lock();
        let task = state.pop_due(now);
        if task.is_some() {
            metrics::record_queue_depth(state.by_due.len());
        }
        task
    }

    /// The earliest due task, left in place.
    pub fn peek(&self) -> Option<RetryTask> {
        let now = Utc::now();
        self.lock()
            .by_due
            .values()
            .next()
            .filter(|task| task.is_due(now))
            .cloned()
    }

    pub fn size(&self) -> usize {
        self.lock().by_due.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Snapshot of every task, earliest first.
    pub fn get_all(&self) -> Vec<RetryTask> {
        self.lock().by_due.values().cloned().collect()
    }

    /// Write every task to `path`.
    ///
    /// The snapshot is written next to `path` and renamed over it, so an
    /// interrupted save leaves the previous snapshot intact.
    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        let tasks = self.get_all();
        let staging = staging_path(path);

        let mut writer = BufWriter::new(File::create(&staging)?);
        serde_json::to_writer_pretty(&mut writer, &tasks)?;
        let file = writer.into_inner().map_err(IntoInnerError::into_error)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&staging, path)?;
        info!(count = tasks.len(), path = %path.display(), "Retry queue saved");
        Ok(())
    }

    /// Merge tasks from a snapshot written by [`RetryQueue::save_to_file`].
    ///
    /// A missing file is not an error. Returns how many tasks were loaded.
    pub fn load_from_file(&self, path: &Path) -> std::io::Result<usize> {
        if !path.exists() {
            return Ok(0);
        }
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let tasks: Vec<RetryTask> = serde_json::from_reader(reader)?;
        let count = tasks.len();

        let mut state = self.lock();
        for task in tasks {
            state.insert(task);
        }
        metrics::record_queue_depth(state.by_due.len());
        drop(state);

        info!(count, path = %path.display(), "Retry queue restored");
        Ok(count)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Bodies are JSON documents, so snapshots store them as text.
mod body_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match body {
            Some(bytes) => serializer.serialize_some(&String::from_utf8_lossy(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        Ok(text.map(String::into_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(kind: TaskKind, due_in_secs: i64) -> RetryTask {
        let mut task = RetryTask::new(
            kind,
            "POST",
            "http://ledger:8070/api/v1/reservations",
            BTreeMap::new(),
            Some(br#"{"bookUid":"b1"}"#.to_vec()),
            Duration::ZERO,
            5,
        );
        task.not_before = Utc::now() + chrono::Duration::seconds(due_in_secs);
        task
    }

    #[test]
    fn test_new_task_defaults() {
        let before = Utc::now();
        let task = RetryTask::new(
            TaskKind::RollbackReservation,
            "DELETE",
            "http://ledger/x",
            BTreeMap::new(),
            None,
            Duration::from_secs(10),
            5,
        );
        assert_eq!(task.attempt, 0);
        assert!(task.not_before >= before + chrono::Duration::seconds(10));
        assert!(Uuid::parse_str(&task.id).is_ok());
    }

    #[test]
    fn test_dequeue_returns_earliest_due_task() {
        let queue = RetryQueue::new();
        let later = task(TaskKind::ReturnBook, -5);
        let earlier = task(TaskKind::CreateReservation, -30);
        queue.enqueue(later.clone());
        queue.enqueue(earlier.clone());

        assert_eq!(queue.dequeue().map(|t| t.id), Some(earlier.id));
        assert_eq!(queue.dequeue().map(|t| t.id), Some(later.id));
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_future_tasks_are_not_due() {
        let queue = RetryQueue::new();
        queue.enqueue(task(TaskKind::CreateReservation, 60));

        assert!(queue.dequeue().is_none());
        assert!(queue.peek().is_none());
        assert_eq!(queue.size(), 1);

        let future = Utc::now() + chrono::Duration::seconds(120);
        assert!(queue.dequeue_due(future).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_reenqueue_same_id_replaces_entry() {
        let queue = RetryQueue::new();
        let mut original = task(TaskKind::CreateReservation, -10);
        queue.enqueue(original.clone());

        original.attempt = 1;
        original.not_before = Utc::now() + chrono::Duration::seconds(10);
        queue.enqueue(original.clone());

        assert_eq!(queue.size(), 1);
        assert!(queue.dequeue().is_none());
        assert_eq!(queue.get_all()[0].attempt, 1);
    }

    #[test]
    fn test_peek_leaves_task_in_place() {
        let queue = RetryQueue::new();
        let due = task(TaskKind::RollbackReturn, -1);
        queue.enqueue(due.clone());

        assert_eq!(queue.peek().map(|t| t.id), Some(due.id.clone()));
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn test_attempt_budget() {
        let mut t = task(TaskKind::CreateReservation, 0);
        t.attempt = 3;
        assert!(t.has_attempts_left());
        t.attempt = 4;
        assert!(!t.has_attempts_left());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let queue = RetryQueue::new();
        let first = task(TaskKind::CreateReservation, -1);
        let second = task(TaskKind::RollbackReservation, 30);
        queue.enqueue(first.clone());
        queue.enqueue(second.clone());
        queue.save_to_file(&path).unwrap();

        let restored = RetryQueue::new();
        assert_eq!(restored.load_from_file(&path).unwrap(), 2);
        let tasks = restored.get_all();
        assert_eq!(tasks[0], first);
        assert_eq!(tasks[1], second);
    }

    #[test]
    fn test_snapshot_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let queue = RetryQueue::new();
        queue.enqueue(task(TaskKind::CreateReservation, -1));
        queue.enqueue(task(TaskKind::ReturnBook, 5));
        queue.save_to_file(&path).unwrap();

        queue.dequeue().unwrap();
        queue.save_to_file(&path).unwrap();

        assert!(!staging_path(&path).exists());
        let restored = RetryQueue::new();
        assert_eq!(restored.load_from_file(&path).unwrap(), 1);
    }

    #[test]
    fn test_failed_save_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let queue = RetryQueue::new();
        queue.enqueue(task(TaskKind::CreateReservation, -1));
        queue.save_to_file(&path).unwrap();

        // A directory squatting on the staging name makes the next write fail.
        std::fs::create_dir(staging_path(&path)).unwrap();
        queue.enqueue(task(TaskKind::ReturnBook, 5));
        assert!(queue.save_to_file(&path).is_err());

        let restored = RetryQueue::new();
        assert_eq!(restored.load_from_file(&path).unwrap(), 1);
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let queue = RetryQueue::new();
        assert_eq!(queue.load_from_file(&dir.path().join("absent.json")).unwrap(), 0);
    }
}
