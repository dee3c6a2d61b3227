use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::api::AppState;
use crate::error::GatewayError;
use crate::task::config::{
    CrawlConfig, ExtractionStrategy, OutputFormat, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS,
};
use crate::task::record::{CrawlResult, TaskRecord, TaskStatus};
use crate::utils::validation::validation_report;

#[derive(Debug, Deserialize)]
pub struct CrawlRequest {
    pub url: String,

    #[serde(default)]
    pub config: CrawlConfig,

    /// Accepted for wire compatibility; currently unused
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Deserialize)]
pub struct BatchCrawlRequest {
    pub urls: Vec<String>,

    #[serde(default)]
    pub config: CrawlConfig,

    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub config: CrawlConfig,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct QuickQuery {
    pub timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct FormatQuery {
    pub format: Option<String>,
}

fn check_rate(state: &AppState) -> Result<(), GatewayError> {
    state.limiter.check().map_err(|_| GatewayError::RateLimited)
}

fn note_ignored_options(options: &Value) {
    if !options.is_null() && options.as_object().map_or(true, |map| !map.is_empty()) {
        debug!("Ignoring unsupported crawl options: {}", options);
    }
}

fn parse_format(query: &FormatQuery) -> Result<OutputFormat, GatewayError> {
    match query.format.as_deref() {
        None => Ok(OutputFormat::Json),
        Some(raw) => OutputFormat::parse(raw).ok_or_else(|| {
            GatewayError::Validation(format!(
                "Unsupported format '{raw}', expected json, markdown, html or text"
            ))
        }),
    }
}

/// Fetch the result of a completed task, for the result/download endpoints
async fn completed_result(
    state: &AppState,
    task_id: &str,
) -> Result<(TaskRecord, CrawlResult), GatewayError> {
    let record = state.orchestrator.get(task_id).await?;

    if record.status != TaskStatus::Completed {
        return Err(GatewayError::Conflict(format!(
            "task {task_id} is not completed yet"
        )));
    }

    match record.result.clone() {
        Some(result) => Ok((record, result)),
        None => Err(GatewayError::NotFound(format!("result for task {task_id}"))),
    }
}

/// POST /api/v1/crawl/
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CrawlRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    check_rate(&state)?;
    note_ignored_options(&request.options);

    let record = state.orchestrator.create(&request.url, request.config).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /api/v1/crawl/batch
pub async fn create_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchCrawlRequest>,
) -> Result<Json<Value>, GatewayError> {
    check_rate(&state)?;
    note_ignored_options(&request.options);

    let receipt = state
        .orchestrator
        .create_batch(&request.urls, request.config)
        .await?;

    Ok(Json(serde_json::to_value(receipt).map_err(|e| {
        GatewayError::Internal(format!("failed to serialize batch receipt: {e}"))
    })?))
}

/// POST /api/v1/crawl/quick?timeout=N
pub async fn quick_crawl(
    State(state): State<AppState>,
    Query(query): Query<QuickQuery>,
    Json(request): Json<CrawlRequest>,
) -> Result<Json<Value>, GatewayError> {
    check_rate(&state)?;
    note_ignored_options(&request.options);

    let timeout = query
        .timeout
        .unwrap_or(state.config.tasks.default_quick_timeout_secs)
        .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);

    let outcome = state
        .orchestrator
        .quick(&request.url, request.config, timeout)
        .await?;

    Ok(Json(json!({
        "success": outcome.result.is_some(),
        "task_id": outcome.task_id,
        "result": outcome.result,
        "error": outcome.error,
        "crawl_time": outcome.crawl_time,
    })))
}

/// GET /api/v1/crawl/?status=&limit=&offset=
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, GatewayError> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(TaskStatus::parse(raw).ok_or_else(|| {
            GatewayError::Validation(format!("Invalid status filter '{raw}'"))
        })?),
    };

    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let offset = query.offset.unwrap_or(0);

    let (tasks, total) = state.orchestrator.list(status, limit, offset).await?;

    Ok(Json(json!({
        "tasks": tasks,
        "total": total,
        "limit": limit,
        "offset": offset,
    })))
}

/// GET /api/v1/crawl/stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<Value>, GatewayError> {
    let stats = state.orchestrator.stats().await?;
    Ok(Json(serde_json::to_value(stats).map_err(|e| {
        GatewayError::Internal(format!("failed to serialize stats: {e}"))
    })?))
}

/// POST /api/v1/crawl/validate - dry run, no task created
pub async fn validate(Json(request): Json<ValidateRequest>) -> Json<Value> {
    let report = validation_report(request.url.as_deref(), &request.config);
    Json(json!({
        "valid": report.valid,
        "errors": report.errors,
        "warnings": report.warnings,
        "suggestions": report.suggestions,
    }))
}

/// GET /api/v1/crawl/{task_id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>, GatewayError> {
    Ok(Json(state.orchestrator.get(&task_id).await?))
}

/// DELETE /api/v1/crawl/{task_id}
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    state.orchestrator.cancel(&task_id).await?;
    Ok(Json(json!({
        "message": format!("Task {task_id} cancelled successfully"),
    })))
}

/// GET /api/v1/crawl/{task_id}/result?format=
pub async fn get_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<FormatQuery>,
) -> Result<Response, GatewayError> {
    let format = parse_format(&query)?;
    let (_, result) = completed_result(&state, &task_id).await?;

    let response = match format {
        OutputFormat::Json => Json(result).into_response(),
        OutputFormat::Markdown => {
            Json(json!({ "content": result.markdown, "format": "markdown" })).into_response()
        }
        OutputFormat::Html => {
            Json(json!({ "content": result.html, "format": "html" })).into_response()
        }
        OutputFormat::Text => {
            Json(json!({ "content": result.text, "format": "text" })).into_response()
        }
    };

    Ok(response)
}

/// GET /api/v1/crawl/{task_id}/download?format=
pub async fn download_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<FormatQuery>,
) -> Result<Response, GatewayError> {
    let format = parse_format(&query)?;
    let (_, result) = completed_result(&state, &task_id).await?;

    let body = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&result)
            .map_err(|e| GatewayError::Internal(format!("failed to serialize result: {e}")))?,
        OutputFormat::Markdown => result.markdown.unwrap_or_default(),
        OutputFormat::Html => result.html.unwrap_or_default(),
        OutputFormat::Text => result.text.unwrap_or_default(),
    };

    let filename = format!("crawl-{task_id}.{}", format.extension());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.mime_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from(body))
        .map_err(|e| GatewayError::Internal(format!("failed to build download response: {e}")))
}

/// GET /api/v1/config/defaults
pub async fn config_defaults() -> Json<Value> {
    Json(json!({
        "config": CrawlConfig::default(),
        "description": "Default configuration for crawl requests",
    }))
}

/// GET /api/v1/config/strategies
pub async fn config_strategies() -> Json<Value> {
    let strategies: Vec<Value> = ExtractionStrategy::catalog()
        .into_iter()
        .map(|(value, label, description)| {
            json!({ "value": value, "label": label, "description": description })
        })
        .collect();

    Json(json!({ "total": strategies.len(), "strategies": strategies }))
}

/// GET /api/v1/config/formats
pub async fn config_formats() -> Json<Value> {
    let formats: Vec<Value> = [
        (OutputFormat::Markdown, "Markdown"),
        (OutputFormat::Html, "HTML"),
        (OutputFormat::Json, "JSON"),
        (OutputFormat::Text, "Plain Text"),
    ]
    .into_iter()
    .map(|(format, label)| {
        json!({
            "value": format.as_str(),
            "label": label,
            "extension": format.extension(),
        })
    })
    .collect();

    Json(json!({ "total": formats.len(), "formats": formats }))
}
