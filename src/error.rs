use crate::task::store::StoreError;

/// Errors surfaced by the gateway's own layers.
///
/// Engine failures are not represented here: once a task exists, an engine
/// error marks the task failed instead of failing the HTTP request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Bad URL or out-of-range parameters
    #[error("{0}")]
    Validation(String),

    /// Unknown task or resource identifier
    #[error("{0} not found")]
    NotFound(String),

    /// Operation not allowed in the task's current lifecycle state
    #[error("{0}")]
    Conflict(String),

    /// Quick-crawl deadline elapsed; the task keeps running in the background
    #[error("crawl did not complete within {0} seconds")]
    Timeout(u64),

    /// Too many task-creating requests
    #[error("rate limit exceeded, retry later")]
    RateLimited,

    /// Invalid or expired API key
    #[error("invalid or expired API key")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Anything else; the HTTP layer hides the details
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable machine-readable code for the error envelope
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Timeout(_) => "TIMEOUT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Store(_) => "STORE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
