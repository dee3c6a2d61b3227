pub mod config;
pub mod events;
pub mod orchestrator;
pub mod record;
pub mod store;

// Re-export common types
pub use config::{CrawlConfig, ExtractionStrategy, OutputFormat};
pub use events::TaskEvent;
pub use orchestrator::TaskOrchestrator;
pub use record::{CrawlResult, TaskRecord, TaskStats, TaskStatus};
pub use store::{InMemoryTaskStore, TaskStore};
