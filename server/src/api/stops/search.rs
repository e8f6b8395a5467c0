use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::AppState;
use crate::models::Stop;

#[derive(Debug, Deserialize, IntoParams)]
pub struct StopSearchQuery {
    /// Substring of a stop code or name, case-insensitive
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StopSearchResponse {
    pub query: String,
    pub stops: Vec<Stop>,
    pub total: usize,
}

/// Search stops by code or name
#[utoipa::path(
    get,
    path = "/api/stops/search",
    params(StopSearchQuery),
    responses(
        (status = 200, description = "Matching stops in catalog order", body = StopSearchResponse)
    ),
    tag = "stops"
)]
pub async fn search_stops(
    State(state): State<AppState>,
    Query(query): Query<StopSearchQuery>,
) -> Json<StopSearchResponse> {
    let stops = state.store.search_stops(&query.q, state.search_limit).await;

    Json(StopSearchResponse {
        query: query.q,
        total: stops.len(),
        stops,
    })
}
