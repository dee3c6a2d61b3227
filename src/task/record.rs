use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::task::config::CrawlConfig;

/// Lifecycle state of a crawl task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal (no further transitions allowed)
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Parse a status from its wire representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A link extracted from the crawled page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLink {
    pub url: String,

    #[serde(default)]
    pub text: String,
}

/// An image reference extracted from the crawled page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageImage {
    pub url: String,

    #[serde(default)]
    pub alt: String,

    #[serde(default)]
    pub title: String,
}

/// Output of a completed crawl, as produced by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    /// URL that was crawled
    pub url: String,

    /// Page title (if available)
    pub title: Option<String>,

    /// Content rendered as Markdown
    pub markdown: Option<String>,

    /// Cleaned HTML content
    pub html: Option<String>,

    /// Plain text content
    pub text: Option<String>,

    /// Structured extracted content, when an extraction strategy produced any
    pub extracted_content: Option<String>,

    /// Base64 encoded screenshot (when requested)
    pub screenshot: Option<String>,

    /// Links discovered on the page
    #[serde(default)]
    pub links: Vec<PageLink>,

    /// Images discovered on the page
    #[serde(default)]
    pub images: Vec<PageImage>,

    /// Engine-reported metadata (status code, content type, ...)
    #[serde(default)]
    pub metadata: Value,

    /// Time taken to crawl, in seconds
    pub crawl_time: f64,

    /// Size of the markdown content in bytes
    pub content_size: usize,
}

/// Bookkeeping record for one crawl request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique identifier, never reused once issued
    pub task_id: String,

    /// URL this task was created for
    pub url: String,

    /// Current lifecycle state
    pub status: TaskStatus,

    /// Fractional progress in [0.0, 1.0]; 1.0 only when completed
    pub progress: f64,

    /// Crawl output, present only when the task completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CrawlResult>,

    /// Failure message, present only when the task failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last state change
    pub updated_at: DateTime<Utc>,

    /// Timestamp at which the task reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Configuration the task was created with, passed through to the engine
    pub config: CrawlConfig,
}

impl TaskRecord {
    /// Create a fresh pending record for the given URL and configuration
    pub fn new(task_id: String, url: String, config: CrawlConfig) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            url,
            status: TaskStatus::Pending,
            progress: 0.0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            config,
        }
    }
}

/// Aggregate statistics over the task store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStats {
    /// Total number of tasks currently stored
    pub total: usize,

    /// Tasks per status
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,

    /// completed / (completed + failed), 0 when no task has finished
    pub success_rate: f64,

    /// Mean crawl time over completed tasks, in seconds
    pub average_crawl_time: f64,

    /// Tasks created during the last 24 hours
    pub created_last_24h: usize,
}
