use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info};

use crate::engine::client::{CrawlEngine, EngineRequest};
use crate::task::config::CrawlConfig;
use crate::task::events::TaskEvent;
use crate::task::record::{CrawlResult, TaskStatus};
use crate::task::store::TaskStore;
use crate::utils::metrics::MetricsCollector;

/// Drives one engine invocation per task.
///
/// The invoker is the only writer of progress/result/error for the task it
/// handles; cancellation elsewhere only flips the status, and a result
/// arriving after that is discarded.
pub struct CrawlInvoker {
    store: Arc<dyn TaskStore>,
    engine: Arc<dyn CrawlEngine>,
    events: broadcast::Sender<TaskEvent>,

    /// Bounds the number of simultaneous engine calls; tasks beyond the
    /// bound stay pending until a slot frees up.
    slots: Arc<Semaphore>,

    metrics: MetricsCollector,
}

impl CrawlInvoker {
    pub fn new(
        store: Arc<dyn TaskStore>,
        engine: Arc<dyn CrawlEngine>,
        events: broadcast::Sender<TaskEvent>,
        max_concurrent: usize,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            store,
            engine,
            events,
            slots: Arc::new(Semaphore::new(max_concurrent)),
            metrics,
        }
    }

    /// Execute the crawl for one task. Intended to be spawned; never returns
    /// an error, all outcomes are written into the task store.
    pub async fn run(&self, task_id: String, url: String, config: CrawlConfig) {
        // Queue for an execution slot
        let permit = match self.slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // semaphore closed only on shutdown
        };

        // The task may have been cancelled while it was queued
        if !self.store_mark_running(&task_id).await {
            debug!("Task {} no longer pending, skipping crawl", task_id);
            return;
        }

        self.push_progress(&task_id, 0.1).await;
        self.push_progress(&task_id, 0.3).await;

        let request = EngineRequest { url, config };

        let start = Instant::now();
        let outcome = self.engine.crawl(request).await;
        let crawl_time = start.elapsed().as_secs_f64();

        drop(permit);

        match outcome {
            Ok(response) => {
                self.push_progress(&task_id, 0.8).await;

                let content_size = response
                    .markdown
                    .as_ref()
                    .map(|m| m.len())
                    .unwrap_or(0);

                let result = CrawlResult {
                    url: response.url,
                    title: response.title,
                    markdown: response.markdown,
                    html: response.html,
                    text: response.text,
                    extracted_content: response.extracted_content,
                    screenshot: response.screenshot,
                    links: response.links,
                    images: response.images,
                    metadata: response.metadata,
                    crawl_time,
                    content_size,
                };

                let stored = self
                    .store
                    .complete(&task_id, result.clone())
                    .await
                    .unwrap_or(false);

                if stored {
                    info!("Task {} completed in {:.2}s", task_id, crawl_time);
                    self.metrics.record_crawl(true, crawl_time, content_size).await;
                    self.emit(TaskEvent::Completed {
                        task_id,
                        result: Box::new(result),
                    });
                } else {
                    // Cancelled while the engine call was in flight
                    debug!("Discarding late result for task {}", task_id);
                }
            }
            Err(e) => {
                let message = e.to_string();

                let stored = self
                    .store
                    .fail(&task_id, message.clone())
                    .await
                    .unwrap_or(false);

                if stored {
                    error!("Task {} failed: {}", task_id, message);
                    self.metrics.record_crawl(false, crawl_time, 0).await;
                    self.emit(TaskEvent::Failed {
                        task_id,
                        error: message,
                    });
                } else {
                    debug!("Discarding late error for task {}", task_id);
                }
            }
        }
    }

    async fn store_mark_running(&self, task_id: &str) -> bool {
        let marked = self.store.mark_running(task_id).await.unwrap_or(false);
        if marked {
            self.emit(TaskEvent::Updated {
                task_id: task_id.to_string(),
                status: TaskStatus::Running,
                progress: 0.0,
                updated_at: Utc::now(),
            });
        }
        marked
    }

    async fn push_progress(&self, task_id: &str, progress: f64) {
        if self.store.set_progress(task_id, progress).await.unwrap_or(false) {
            self.emit(TaskEvent::Updated {
                task_id: task_id.to_string(),
                status: TaskStatus::Running,
                progress,
                updated_at: Utc::now(),
            });
        }
    }

    fn emit(&self, event: TaskEvent) {
        // No subscribers is fine; delivery is advisory
        let _ = self.events.send(event);
    }
}
