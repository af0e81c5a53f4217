//! Liveness endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::warn;

use crate::AppState;

/// 200 when the database answers, 503 otherwise.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match patent_db::ping(&state.pool).await {
        Ok(()) => {
            patent_db::log_pool_metrics(&state.pool);
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "healthy",
                    "version": env!("CARGO_PKG_VERSION"),
                    "database": "ok",
                })),
            )
        }
        Err(e) => {
            warn!(error = %e, "Health check database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "version": env!("CARGO_PKG_VERSION"),
                    "database": e.to_string(),
                })),
            )
        }
    }
}
