pub mod auth;
pub mod crawl;
pub mod error;
pub mod health;
pub mod ws;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use governor::DefaultDirectRateLimiter;

use crate::api::auth::ApiKeyStore;
use crate::cli::config::GatewayConfig;
use crate::engine::client::CrawlEngine;
use crate::task::orchestrator::TaskOrchestrator;
use crate::utils::metrics::MetricsCollector;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TaskOrchestrator>,
    pub engine: Arc<dyn CrawlEngine>,
    pub metrics: MetricsCollector,
    pub keys: Arc<ApiKeyStore>,
    pub limiter: Arc<DefaultDirectRateLimiter>,
    pub config: Arc<GatewayConfig>,
}

/// Assemble the full route table
pub fn router(state: AppState) -> Router {
    let crawl_routes = Router::new()
        .route("/quick", post(crawl::quick_crawl))
        .route("/batch", post(crawl::create_batch))
        .route("/validate", post(crawl::validate))
        .route("/stats", get(crawl::stats))
        .route("/:task_id", get(crawl::get_task).delete(crawl::cancel_task))
        .route("/:task_id/result", get(crawl::get_result))
        .route("/:task_id/download", get(crawl::download_result));

    let config_routes = Router::new()
        .route("/defaults", get(crawl::config_defaults))
        .route("/strategies", get(crawl::config_strategies))
        .route("/formats", get(crawl::config_formats));

    let auth_routes = Router::new()
        .route("/generate-key", post(auth::generate_key_handler))
        .route("/keys", get(auth::list_keys_handler))
        .route("/keys/:key_hash", delete(auth::revoke_key_handler))
        .route("/verify", get(auth::verify_key_handler));

    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/detailed", get(health::detailed))
        .route("/metrics", get(health::metrics));

    Router::new()
        .route(
            "/api/v1/crawl/",
            post(crawl::create_task).get(crawl::list_tasks),
        )
        .nest("/api/v1/crawl", crawl_routes)
        .nest("/api/v1/config", config_routes)
        .nest("/api/v1/auth", auth_routes)
        .nest("/api/v1/health", health_routes)
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}
