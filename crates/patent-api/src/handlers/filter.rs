//! Preview search endpoint.

use axum::{extract::State, Json};

use patent_core::{FilteredPatentsResponse, Filters};

use crate::{ApiError, AppState};

/// Search patents matching `filters` and return one page of summaries.
///
/// # Returns
/// - 200 OK with `{patents, statistics, total_patents}`
/// - 400 Bad Request on a malformed date or negative limit/offset
/// - 502 Bad Gateway if any provider call fails
pub async fn filter_patents(
    State(state): State<AppState>,
    Json(filters): Json<Filters>,
) -> Result<Json<FilteredPatentsResponse>, ApiError> {
    let response = state.filters.search(&filters).await?;
    Ok(Json(response))
}
