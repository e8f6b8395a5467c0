use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::api::error::upstream_unavailable;
use crate::api::{ApiError, AppState, ErrorResponse};

#[derive(Debug, Deserialize, IntoParams)]
pub struct LineSuggestionQuery {
    /// Partial line code or name
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LineSuggestionsResponse {
    pub query: String,
    /// Suggestions as published upstream
    pub suggestions: Value,
}

/// Line suggestions for a partial code or name
#[utoipa::path(
    get,
    path = "/api/lines/suggestions",
    params(LineSuggestionQuery),
    responses(
        (status = 200, description = "Upstream line suggestions", body = LineSuggestionsResponse),
        (status = 503, description = "Suggestion source unavailable", body = ErrorResponse)
    ),
    tag = "lines"
)]
pub async fn suggest_lines(
    State(state): State<AppState>,
    Query(query): Query<LineSuggestionQuery>,
) -> Result<Json<LineSuggestionsResponse>, ApiError> {
    if query.q.trim().is_empty() {
        return Ok(Json(LineSuggestionsResponse {
            query: query.q,
            suggestions: Value::Array(Vec::new()),
        }));
    }

    let suggestions = state
        .store
        .line_suggestions(query.q.trim())
        .await
        .map_err(|e| upstream_unavailable(format!("Line suggestions unavailable: {}", e)))?;

    Ok(Json(LineSuggestionsResponse {
        query: query.q,
        suggestions,
    }))
}
