//! # patent-api
//!
//! HTTP surface of patent-upload: the preview search (`POST /filter`) and a
//! liveness probe (`GET /health`). The binary in `main.rs` also runs the
//! upload worker.

pub mod config;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use patent_jobs::FilterService;

pub use config::AppConfig;
pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub filters: Arc<FilterService>,
    pub pool: PgPool,
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/filter", post(handlers::filter_patents))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
