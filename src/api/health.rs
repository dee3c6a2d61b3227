use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::GatewayError;

const SERVICE_NAME: &str = "crawl-gateway";

/// GET /api/v1/health/
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/v1/health/detailed
pub async fn detailed(State(state): State<AppState>) -> Result<Json<Value>, GatewayError> {
    let stats = state.orchestrator.stats().await?;
    let metrics = state.metrics.get_metrics().await;

    let engine_status = match state.engine.probe().await {
        Ok(()) => "available",
        Err(_) => "unreachable",
    };

    Ok(Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": metrics.uptime_secs(),
        "services": {
            "engine": engine_status,
            "engine_url": state.config.engine.url,
            "active_tasks": stats.running,
            "total_tasks": stats.total,
        },
        "limits": {
            "max_concurrent_crawls": state.config.tasks.max_concurrent_crawls,
            "max_batch_urls": state.config.tasks.max_batch_urls,
            "rate_limit_per_minute": state.config.server.rate_limit_per_minute,
        },
    })))
}

/// GET /api/v1/health/metrics
pub async fn metrics(State(state): State<AppState>) -> Json<Value> {
    let metrics = state.metrics.get_metrics().await;

    Json(json!({
        "timestamp": Utc::now(),
        "uptime_secs": metrics.uptime_secs(),
        "tasks": {
            "created": metrics.tasks_created,
            "successful_crawls": metrics.successful_crawls,
            "failed_crawls": metrics.failed_crawls,
        },
        "crawl_time": {
            "total_secs": metrics.total_crawl_time,
            "average_secs": metrics.average_crawl_time(),
            "max_secs": metrics.max_crawl_time,
        },
        "bytes_downloaded": metrics.bytes_downloaded,
        "websocket": {
            "active_clients": metrics.active_ws_clients,
        },
    }))
}
