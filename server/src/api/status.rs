use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::AppState;
use crate::store::StoreStatus;

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub cache: StoreStatus,
    pub tracked_vehicles: usize,
}

pub fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(get_status))
}

/// Cache and tracker counters
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Current counters", body = StatusResponse)
    ),
    tag = "status"
)]
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        cache: state.store.status().await,
        tracked_vehicles: state.tracker.len(),
    })
}
