use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::messaging::ForwardError;
use crate::normalize::NormalizeError;

/// Failures a webhook handler reports back to the calling platform.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Forward(#[from] ForwardError),
}

impl From<NormalizeError> for WebhookError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::InvalidPayload { reason } => WebhookError::InvalidPayload(reason),
        }
    }
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::Forward(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let body = match &self {
            WebhookError::InvalidPayload(reason) => json!({
                "success": false,
                "error": "Invalid payload",
                "details": reason,
            }),
            WebhookError::Forward(err) => json!({
                "success": false,
                "error": "Failed to forward to Roblox",
                "details": err.details(),
            }),
        };
        (self.status(), Json(body)).into_response()
    }
}
