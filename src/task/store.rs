use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::task::record::{CrawlResult, TaskRecord, TaskStatus};

/// Error surfaced by a task store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Outcome of a cancellation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was pending or running and is now cancelled
    Cancelled,

    /// The task had already reached a terminal state
    AlreadyTerminal,

    /// No task with that identifier exists
    NotFound,
}

/// Storage abstraction for task records.
///
/// State transitions go through dedicated methods that check the current
/// status under the store's own lock, so only the invoker handling a task
/// can move it forward and a terminal record is never overwritten.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a freshly created record
    async fn insert(&self, record: TaskRecord) -> Result<(), StoreError>;

    /// Fetch a record by task identifier
    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError>;

    /// List records, newest first, with optional status filter and pagination.
    /// Returns the page of records and the total number of matches.
    async fn list(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<TaskRecord>, usize), StoreError>;

    /// Transition a pending task to running. Returns false if the task is
    /// missing or no longer pending (e.g. cancelled while queued).
    async fn mark_running(&self, task_id: &str) -> Result<bool, StoreError>;

    /// Update the progress of a running task. Progress never decreases and is
    /// clamped to [0.0, 1.0]. Returns false if the task is not running.
    async fn set_progress(&self, task_id: &str, progress: f64) -> Result<bool, StoreError>;

    /// Transition a task to completed with its result. Returns false if the
    /// task is already terminal; the caller must discard the result.
    async fn complete(&self, task_id: &str, result: CrawlResult) -> Result<bool, StoreError>;

    /// Transition a task to failed with an error message. Returns false if
    /// the task is already terminal.
    async fn fail(&self, task_id: &str, error: String) -> Result<bool, StoreError>;

    /// Cancel a non-terminal task
    async fn cancel(&self, task_id: &str) -> Result<CancelOutcome, StoreError>;

    /// Remove a record entirely. Returns false if it did not exist.
    async fn delete(&self, task_id: &str) -> Result<bool, StoreError>;

    /// Snapshot of every stored record, for aggregate statistics
    async fn snapshot(&self) -> Result<Vec<TaskRecord>, StoreError>;
}

/// In-memory task store. All state is volatile and lost on restart.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, record: TaskRecord) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(record.task_id.clone(), record);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(task_id).cloned())
    }

    async fn list(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<TaskRecord>, usize), StoreError> {
        let tasks = self.tasks.read().await;

        let mut matching: Vec<TaskRecord> = tasks
            .values()
            .filter(|record| status.map_or(true, |s| record.status == s))
            .cloned()
            .collect();

        // Newest first
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len();
        let page = matching.into_iter().skip(offset).take(limit).collect();

        Ok((page, total))
    }

    async fn mark_running(&self, task_id: &str) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;

        match tasks.get_mut(task_id) {
            Some(record) if record.status == TaskStatus::Pending => {
                record.status = TaskStatus::Running;
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_progress(&self, task_id: &str, progress: f64) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;

        match tasks.get_mut(task_id) {
            Some(record) if record.status == TaskStatus::Running => {
                // Monotonic: ignore regressions, clamp into [0, 1]
                let clamped = progress.clamp(0.0, 1.0);
                if clamped > record.progress {
                    record.progress = clamped;
                }
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(&self, task_id: &str, result: CrawlResult) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;

        match tasks.get_mut(task_id) {
            Some(record) if !record.status.is_terminal() => {
                let now = Utc::now();
                record.status = TaskStatus::Completed;
                record.progress = 1.0;
                record.result = Some(result);
                record.error = None;
                record.updated_at = now;
                record.completed_at = Some(now);
                Ok(true)
            }
            Some(record) => {
                debug!(
                    "Refusing result write on {} task {}",
                    record.status.as_str(),
                    task_id
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn fail(&self, task_id: &str, error: String) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;

        match tasks.get_mut(task_id) {
            Some(record) if !record.status.is_terminal() => {
                let now = Utc::now();
                record.status = TaskStatus::Failed;
                record.result = None;
                record.error = Some(error);
                record.updated_at = now;
                record.completed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel(&self, task_id: &str) -> Result<CancelOutcome, StoreError> {
        let mut tasks = self.tasks.write().await;

        match tasks.get_mut(task_id) {
            Some(record) if record.status.is_terminal() => Ok(CancelOutcome::AlreadyTerminal),
            Some(record) => {
                let now = Utc::now();
                record.status = TaskStatus::Cancelled;
                record.updated_at = now;
                record.completed_at = Some(now);
                Ok(CancelOutcome::Cancelled)
            }
            None => Ok(CancelOutcome::NotFound),
        }
    }

    async fn delete(&self, task_id: &str) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks.remove(task_id).is_some())
    }

    async fn snapshot(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.values().cloned().collect())
    }
}
