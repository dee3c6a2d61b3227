pub mod logging;
pub mod metrics;
pub mod validation;

// Re-export common functions and types
pub use logging::init_logging;
pub use metrics::{MetricsCollector, Metrics};
