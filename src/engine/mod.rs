pub mod client;
pub mod invoker;

// Re-export common types
pub use client::{CrawlEngine, EngineError, EngineRequest, EngineResponse, RemoteEngineClient};
pub use invoker::CrawlInvoker;
