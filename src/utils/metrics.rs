use std::sync::Arc;
use tokio::sync::Mutex;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Service-level metrics collector
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    /// In-memory metrics store
    metrics: Arc<Mutex<Metrics>>,
}

/// Metrics data structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// Start time of the metrics collection
    pub start_time: DateTime<Utc>,

    /// Tasks created since startup
    pub tasks_created: usize,

    /// Crawls that completed successfully
    pub successful_crawls: usize,

    /// Crawls that failed
    pub failed_crawls: usize,

    /// Total time spent in engine calls, in seconds
    pub total_crawl_time: f64,

    /// Longest single engine call, in seconds
    pub max_crawl_time: f64,

    /// Bytes of markdown content received from the engine
    pub bytes_downloaded: usize,

    /// Currently connected WebSocket clients
    pub active_ws_clients: usize,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            start_time: Utc::now(),
            tasks_created: 0,
            successful_crawls: 0,
            failed_crawls: 0,
            total_crawl_time: 0.0,
            max_crawl_time: 0.0,
            bytes_downloaded: 0,
            active_ws_clients: 0,
        }
    }
}

impl Metrics {
    /// Mean engine call duration in seconds, 0 before the first crawl
    pub fn average_crawl_time(&self) -> f64 {
        let finished = self.successful_crawls + self.failed_crawls;
        if finished == 0 {
            0.0
        } else {
            self.total_crawl_time / finished as f64
        }
    }

    /// Seconds since the collector started
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(Mutex::new(Metrics::default())),
        }
    }

    /// Record a task creation
    pub async fn record_task_created(&self) {
        let mut metrics = self.metrics.lock().await;
        metrics.tasks_created += 1;
    }

    /// Record a finished engine call
    pub async fn record_crawl(&self, success: bool, duration_secs: f64, bytes: usize) {
        let mut metrics = self.metrics.lock().await;

        if success {
            metrics.successful_crawls += 1;
        } else {
            metrics.failed_crawls += 1;
        }

        metrics.total_crawl_time += duration_secs;
        metrics.max_crawl_time = metrics.max_crawl_time.max(duration_secs);
        metrics.bytes_downloaded += bytes;
    }

    /// Record a WebSocket client connecting
    pub async fn client_connected(&self) {
        let mut metrics = self.metrics.lock().await;
        metrics.active_ws_clients += 1;
    }

    /// Record a WebSocket client disconnecting
    pub async fn client_disconnected(&self) {
        let mut metrics = self.metrics.lock().await;
        metrics.active_ws_clients = metrics.active_ws_clients.saturating_sub(1);
    }

    /// Get a snapshot of all metrics
    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.lock().await.clone()
    }

    /// Reset metrics
    pub async fn reset(&self) {
        let mut metrics = self.metrics.lock().await;
        *metrics = Metrics::default();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
