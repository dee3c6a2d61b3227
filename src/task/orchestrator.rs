use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Serialize, Deserialize};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cli::config::TaskSettings;
use crate::engine::client::CrawlEngine;
use crate::engine::invoker::CrawlInvoker;
use crate::error::GatewayError;
use crate::task::config::CrawlConfig;
use crate::task::events::TaskEvent;
use crate::task::record::{CrawlResult, TaskRecord, TaskStats, TaskStatus};
use crate::task::store::{CancelOutcome, TaskStore};
use crate::utils::metrics::MetricsCollector;
use crate::utils::validation::{check_config, validate_url};

/// Receipt returned for a batch creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub batch_id: String,
    pub task_ids: Vec<String>,
    pub total_tasks: usize,
    pub status: String,
}

/// Outcome of a synchronous quick crawl
#[derive(Debug, Clone)]
pub struct QuickOutcome {
    pub task_id: String,
    pub result: Option<CrawlResult>,
    pub error: Option<String>,
    pub crawl_time: f64,
}

/// Creates tasks, drives them through their lifecycle and answers queries.
///
/// All task mutation flows through here: the invoker it spawns is the only
/// writer of progress/result/error, and cancellation only flips status.
pub struct TaskOrchestrator {
    store: Arc<dyn TaskStore>,
    invoker: Arc<CrawlInvoker>,
    events: broadcast::Sender<TaskEvent>,
    settings: TaskSettings,
    metrics: MetricsCollector,
}

impl TaskOrchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        engine: Arc<dyn CrawlEngine>,
        settings: TaskSettings,
        metrics: MetricsCollector,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_buffer.max(16));

        let invoker = Arc::new(CrawlInvoker::new(
            store.clone(),
            engine,
            events.clone(),
            settings.max_concurrent_crawls.max(1),
            metrics.clone(),
        ));

        Self {
            store,
            invoker,
            events,
            settings,
            metrics,
        }
    }

    /// Subscribe to task-state transitions
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Create a task for a single URL and start crawling in the background
    pub async fn create(
        &self,
        url: &str,
        config: CrawlConfig,
    ) -> Result<TaskRecord, GatewayError> {
        let parsed = validate_url(url)?;
        check_config(&config)?;

        let task_id = Uuid::new_v4().to_string();
        let record = TaskRecord::new(task_id.clone(), parsed.to_string(), config.clone());

        self.store.insert(record.clone()).await?;
        self.metrics.record_task_created().await;

        info!("Created crawl task {} for {}", task_id, record.url);

        // Hand off to the invoker; the HTTP response does not wait for this
        let invoker = self.invoker.clone();
        let url = record.url.clone();
        tokio::spawn(async move {
            invoker.run(task_id, url, config).await;
        });

        Ok(record)
    }

    /// Create one task per URL. The whole batch is rejected if any URL is
    /// invalid, so a receipt always covers every requested URL.
    pub async fn create_batch(
        &self,
        urls: &[String],
        config: CrawlConfig,
    ) -> Result<BatchReceipt, GatewayError> {
        if urls.is_empty() {
            return Err(GatewayError::Validation(
                "At least one URL is required".to_string(),
            ));
        }

        if urls.len() > self.settings.max_batch_urls {
            return Err(GatewayError::Validation(format!(
                "Maximum {} URLs allowed per batch",
                self.settings.max_batch_urls
            )));
        }

        check_config(&config)?;

        // Validate everything up front; nothing is created on failure
        for (i, url) in urls.iter().enumerate() {
            validate_url(url)
                .map_err(|e| GatewayError::Validation(format!("URL {}: {e}", i + 1)))?;
        }

        let batch_id = Uuid::new_v4().to_string();
        let mut task_ids = Vec::with_capacity(urls.len());

        for url in urls {
            let record = self.create(url, config.clone()).await?;
            task_ids.push(record.task_id);
        }

        debug!("Created batch {} with {} tasks", batch_id, task_ids.len());

        Ok(BatchReceipt {
            total_tasks: task_ids.len(),
            batch_id,
            task_ids,
            status: "created".to_string(),
        })
    }

    /// Fetch a task record
    pub async fn get(&self, task_id: &str) -> Result<TaskRecord, GatewayError> {
        self.store
            .get(task_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("task {task_id}")))
    }

    /// List tasks, newest first
    pub async fn list(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<TaskRecord>, usize), GatewayError> {
        Ok(self.store.list(status, limit, offset).await?)
    }

    /// Cancel a non-terminal task. Best effort: an in-flight engine call
    /// keeps running and its late result is discarded.
    pub async fn cancel(&self, task_id: &str) -> Result<(), GatewayError> {
        match self.store.cancel(task_id).await? {
            CancelOutcome::Cancelled => {
                info!("Cancelled task {}", task_id);
                let _ = self.events.send(TaskEvent::Updated {
                    task_id: task_id.to_string(),
                    status: TaskStatus::Cancelled,
                    progress: 0.0,
                    updated_at: Utc::now(),
                });
                Ok(())
            }
            CancelOutcome::AlreadyTerminal => Err(GatewayError::Conflict(format!(
                "task {task_id} has already finished and cannot be cancelled"
            ))),
            CancelOutcome::NotFound => Err(GatewayError::NotFound(format!("task {task_id}"))),
        }
    }

    /// Aggregate statistics over all stored tasks
    pub async fn stats(&self) -> Result<TaskStats, GatewayError> {
        let records = self.store.snapshot().await?;

        let mut stats = TaskStats {
            total: records.len(),
            pending: 0,
            running: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            success_rate: 0.0,
            average_crawl_time: 0.0,
            created_last_24h: 0,
        };

        let cutoff = Utc::now() - ChronoDuration::hours(24);
        let mut crawl_time_sum = 0.0;

        for record in &records {
            match record.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }

            if record.created_at > cutoff {
                stats.created_last_24h += 1;
            }

            if let Some(result) = &record.result {
                crawl_time_sum += result.crawl_time;
            }
        }

        let finished = stats.completed + stats.failed;
        if finished > 0 {
            stats.success_rate = stats.completed as f64 / finished as f64;
        }
        if stats.completed > 0 {
            stats.average_crawl_time = crawl_time_sum / stats.completed as f64;
        }

        Ok(stats)
    }

    /// Synchronous variant: create a task and wait up to `timeout_secs` for
    /// a terminal state. On timeout the task keeps running in the background
    /// and stays retrievable through `get`.
    pub async fn quick(
        &self,
        url: &str,
        config: CrawlConfig,
        timeout_secs: u64,
    ) -> Result<QuickOutcome, GatewayError> {
        // Subscribe before creating so no transition can be missed
        let receiver = self.events.subscribe();

        let record = self.create(url, config).await?;
        let task_id = record.task_id.clone();

        let wait = self.wait_for_terminal(receiver, &task_id);

        match tokio::time::timeout(Duration::from_secs(timeout_secs), wait).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => Err(GatewayError::Timeout(timeout_secs)),
        }
    }

    async fn wait_for_terminal(
        &self,
        mut receiver: broadcast::Receiver<TaskEvent>,
        task_id: &str,
    ) -> QuickOutcome {
        loop {
            match receiver.recv().await {
                Ok(event) if event.task_id() == task_id => match event {
                    TaskEvent::Completed { result, .. } => {
                        let crawl_time = result.crawl_time;
                        return QuickOutcome {
                            task_id: task_id.to_string(),
                            result: Some(*result),
                            error: None,
                            crawl_time,
                        };
                    }
                    TaskEvent::Failed { error, .. } => {
                        return QuickOutcome {
                            task_id: task_id.to_string(),
                            result: None,
                            error: Some(error),
                            crawl_time: 0.0,
                        };
                    }
                    TaskEvent::Updated { status, .. } if status.is_terminal() => {
                        return QuickOutcome {
                            task_id: task_id.to_string(),
                            result: None,
                            error: Some(format!("task was {}", status.as_str())),
                            crawl_time: 0.0,
                        };
                    }
                    _ => {}
                },
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Event receiver lagged by {} events, checking store", skipped);
                    if let Ok(Some(record)) = self.store.get(task_id).await {
                        if record.status.is_terminal() {
                            let crawl_time = record
                                .result
                                .as_ref()
                                .map(|r| r.crawl_time)
                                .unwrap_or(0.0);
                            return QuickOutcome {
                                task_id: task_id.to_string(),
                                result: record.result,
                                error: record.error,
                                crawl_time,
                            };
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return QuickOutcome {
                        task_id: task_id.to_string(),
                        result: None,
                        error: Some("event channel closed".to_string()),
                        crawl_time: 0.0,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    use crate::engine::client::{
        CrawlEngine, EngineError, EngineRequest, EngineResponse, MockCrawlEngine,
    };
    use crate::task::store::InMemoryTaskStore;

    fn settings() -> TaskSettings {
        TaskSettings {
            max_concurrent_crawls: 4,
            max_batch_urls: 10,
            event_buffer: 64,
            default_quick_timeout_secs: 60,
        }
    }

    fn success_response(url: &str) -> EngineResponse {
        EngineResponse {
            success: true,
            url: url.to_string(),
            title: Some("Example Domain".to_string()),
            markdown: Some("# Example Domain".to_string()),
            html: Some("<h1>Example Domain</h1>".to_string()),
            text: Some("Example Domain".to_string()),
            extracted_content: None,
            screenshot: None,
            links: vec![],
            images: vec![],
            metadata: serde_json::json!({"status_code": 200}),
            error: None,
        }
    }

    fn orchestrator_with(engine: Arc<dyn CrawlEngine>) -> TaskOrchestrator {
        TaskOrchestrator::new(
            InMemoryTaskStore::new(),
            engine,
            settings(),
            MetricsCollector::new(),
        )
    }

    /// Engine stub with a configurable delay, for timeout and cancel tests
    struct SlowEngine {
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl CrawlEngine for SlowEngine {
        async fn crawl(&self, request: EngineRequest) -> Result<EngineResponse, EngineError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(EngineError::Rejected("navigation timed out".to_string()))
            } else {
                Ok(success_response(&request.url))
            }
        }

        async fn probe(&self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    async fn wait_terminal(mut receiver: broadcast::Receiver<TaskEvent>, task_id: &str) {
        let wait = async {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.task_id() == task_id && event.is_terminal() => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(30), wait)
            .await
            .expect("task did not reach a terminal state");
    }

    #[tokio::test]
    async fn test_create_returns_pending_with_distinct_ids() {
        let mut engine = MockCrawlEngine::new();
        engine
            .expect_crawl()
            .returning(|request| Ok(success_response(&request.url)));
        let orchestrator = orchestrator_with(Arc::new(engine));

        let first = orchestrator
            .create("https://example.com", CrawlConfig::default())
            .await
            .unwrap();
        let second = orchestrator
            .create("https://example.com", CrawlConfig::default())
            .await
            .unwrap();

        assert_eq!(first.status, TaskStatus::Pending);
        assert_eq!(first.progress, 0.0);
        assert_ne!(first.task_id, second.task_id);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_url_without_storing() {
        let orchestrator = orchestrator_with(Arc::new(MockCrawlEngine::new()));

        let err = orchestrator
            .create("ftp://example.com", CrawlConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));

        let (_, total) = orchestrator.list(None, 10, 0).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_lifecycle_reaches_completed_with_result() {
        let mut engine = MockCrawlEngine::new();
        engine
            .expect_crawl()
            .returning(|request| Ok(success_response(&request.url)));
        let orchestrator = orchestrator_with(Arc::new(engine));

        let receiver = orchestrator.subscribe();
        let record = orchestrator
            .create("https://example.com", CrawlConfig::default())
            .await
            .unwrap();
        wait_terminal(receiver, &record.task_id).await;

        let finished = orchestrator.get(&record.task_id).await.unwrap();
        assert_eq!(finished.status, TaskStatus::Completed);
        assert_eq!(finished.progress, 1.0);
        let result = finished.result.expect("completed task has a result");
        assert_eq!(result.title.as_deref(), Some("Example Domain"));
        assert!(finished.error.is_none());
    }

    #[tokio::test]
    async fn test_engine_failure_marks_task_failed() {
        let mut engine = MockCrawlEngine::new();
        engine
            .expect_crawl()
            .returning(|_| Err(EngineError::Rejected("boom".to_string())));
        let orchestrator = orchestrator_with(Arc::new(engine));

        let receiver = orchestrator.subscribe();
        let record = orchestrator
            .create("https://example.com", CrawlConfig::default())
            .await
            .unwrap();
        wait_terminal(receiver, &record.task_id).await;

        let finished = orchestrator.get(&record.task_id).await.unwrap();
        assert_eq!(finished.status, TaskStatus::Failed);
        assert_eq!(finished.error.as_deref(), Some("boom"));
        assert!(finished.result.is_none());
    }

    #[tokio::test]
    async fn test_progress_events_are_monotonic() {
        let mut engine = MockCrawlEngine::new();
        engine
            .expect_crawl()
            .returning(|request| Ok(success_response(&request.url)));
        let orchestrator = orchestrator_with(Arc::new(engine));

        let mut receiver = orchestrator.subscribe();
        let record = orchestrator
            .create("https://example.com", CrawlConfig::default())
            .await
            .unwrap();

        let mut last_progress = 0.0;
        let collect = async {
            loop {
                match receiver.recv().await {
                    Ok(TaskEvent::Updated { task_id, progress, .. })
                        if task_id == record.task_id =>
                    {
                        assert!(progress >= last_progress, "progress went backwards");
                        last_progress = progress;
                    }
                    Ok(event) if event.task_id() == record.task_id && event.is_terminal() => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(30), collect)
            .await
            .expect("task did not finish");
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_times_out_and_task_keeps_running() {
        let engine = SlowEngine {
            delay: Duration::from_secs(10),
            fail: false,
        };
        let orchestrator = Arc::new(orchestrator_with(Arc::new(engine)));

        let receiver = orchestrator.subscribe();
        let err = orchestrator
            .quick("https://example.com", CrawlConfig::default(), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(5)));

        // The underlying task is still there and eventually completes
        let (tasks, total) = orchestrator.list(None, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        let task_id = tasks[0].task_id.clone();

        wait_terminal(receiver, &task_id).await;
        let finished = orchestrator.get(&task_id).await.unwrap();
        assert_eq!(finished.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_quick_returns_result_inline() {
        let mut engine = MockCrawlEngine::new();
        engine
            .expect_crawl()
            .returning(|request| Ok(success_response(&request.url)));
        let orchestrator = orchestrator_with(Arc::new(engine));

        let outcome = orchestrator
            .quick("https://example.com", CrawlConfig::default(), 30)
            .await
            .unwrap();

        assert!(outcome.error.is_none());
        let result = outcome.result.expect("quick crawl result");
        assert_eq!(result.title.as_deref(), Some("Example Domain"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_late_result() {
        let engine = SlowEngine {
            delay: Duration::from_secs(10),
            fail: false,
        };
        let orchestrator = orchestrator_with(Arc::new(engine));

        let record = orchestrator
            .create("https://example.com", CrawlConfig::default())
            .await
            .unwrap();

        // Let the invoker pick the task up, then cancel mid-flight
        tokio::time::sleep(Duration::from_secs(1)).await;
        orchestrator.cancel(&record.task_id).await.unwrap();

        // Cancelling again conflicts
        let err = orchestrator.cancel(&record.task_id).await.unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));

        // Let the engine call finish; its result must be discarded
        tokio::time::sleep(Duration::from_secs(15)).await;
        let finished = orchestrator.get(&record.task_id).await.unwrap();
        assert_eq!(finished.status, TaskStatus::Cancelled);
        assert!(finished.result.is_none());
        assert!(finished.error.is_none());
    }

    #[tokio::test]
    async fn test_cancel_unknown_task() {
        let orchestrator = orchestrator_with(Arc::new(MockCrawlEngine::new()));
        let err = orchestrator.cancel("missing").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stats_success_rate() {
        let mut engine = MockCrawlEngine::new();
        let mut fail_next = false;
        engine.expect_crawl().returning(move |request| {
            fail_next = !fail_next;
            if fail_next {
                Ok(success_response(&request.url))
            } else {
                Err(EngineError::Rejected("boom".to_string()))
            }
        });
        let orchestrator = orchestrator_with(Arc::new(engine));

        let receiver_a = orchestrator.subscribe();
        let a = orchestrator
            .create("https://example.com/a", CrawlConfig::default())
            .await
            .unwrap();
        wait_terminal(receiver_a, &a.task_id).await;

        let receiver_b = orchestrator.subscribe();
        let b = orchestrator
            .create("https://example.com/b", CrawlConfig::default())
            .await
            .unwrap();
        wait_terminal(receiver_b, &b.task_id).await;

        let stats = orchestrator.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.success_rate, 0.5);
        assert_eq!(stats.created_last_24h, 2);
        assert!(stats.average_crawl_time >= 0.0);
    }

    #[tokio::test]
    async fn test_stats_empty_store() {
        let orchestrator = orchestrator_with(Arc::new(MockCrawlEngine::new()));
        let stats = orchestrator.stats().await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.average_crawl_time, 0.0);
    }

    #[tokio::test]
    async fn test_batch_rejects_any_invalid_url() {
        let orchestrator = orchestrator_with(Arc::new(MockCrawlEngine::new()));

        let urls = vec![
            "https://example.com/a".to_string(),
            "ftp://example.com/b".to_string(),
        ];
        let err = orchestrator
            .create_batch(&urls, CrawlConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));

        let (_, total) = orchestrator.list(None, 10, 0).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_batch_creates_one_task_per_url() {
        let mut engine = MockCrawlEngine::new();
        engine
            .expect_crawl()
            .returning(|request| Ok(success_response(&request.url)));
        let orchestrator = orchestrator_with(Arc::new(engine));

        let urls = vec![
            "https://example.com/a".to_string(),
            "https://example.com/b".to_string(),
            "https://example.com/c".to_string(),
        ];
        let receipt = orchestrator
            .create_batch(&urls, CrawlConfig::default())
            .await
            .unwrap();

        assert_eq!(receipt.total_tasks, 3);
        assert_eq!(receipt.task_ids.len(), 3);
        assert_eq!(receipt.status, "created");

        let (_, total) = orchestrator.list(None, 10, 0).await.unwrap();
        assert_eq!(total, 3);
    }
}
