use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::error;

use crate::error::GatewayError;

/// Wire shape of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub detail: String,
    pub error_code: String,
    pub timestamp: DateTime<Utc>,
}

fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::Conflict(_) => StatusCode::CONFLICT,
        GatewayError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
        GatewayError::Store(_) | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = status_for(&self);

        // Server-side failures are logged but never leaked to the client
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Internal error: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let envelope = ErrorEnvelope {
            detail,
            error_code: self.error_code().to_string(),
            timestamp: Utc::now(),
        };

        (status, Json(envelope)).into_response()
    }
}
