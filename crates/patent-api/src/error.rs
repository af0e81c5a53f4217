//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

/// Error returned by HTTP handlers, rendered as `{"error": message}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// The upstream provider failed or answered with something unusable.
    BadGateway(String),
    Internal(String),
}

impl From<patent_core::Error> for ApiError {
    fn from(err: patent_core::Error) -> Self {
        use patent_core::Error;
        match err {
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Provider(_) | Error::Request(_) | Error::MalformedResponse(_) => {
                ApiError::BadGateway(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
