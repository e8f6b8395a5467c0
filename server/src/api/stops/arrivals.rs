use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::error::estimate_error;
use crate::api::{ApiError, AppState, ErrorResponse};
use crate::models::ArrivalResult;

/// Estimated arrivals of live vehicles at a stop
#[utoipa::path(
    get,
    path = "/api/stops/{code}/arrivals",
    params(
        ("code" = String, Path, description = "Stop code, e.g. 133691")
    ),
    responses(
        (status = 200, description = "Approaching vehicles, soonest first", body = ArrivalResult),
        (status = 404, description = "Unknown stop or stop without coordinates", body = ErrorResponse),
        (status = 504, description = "Stop lookup exceeded the request deadline", body = ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn get_arrivals(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ArrivalResult>, ApiError> {
    state
        .estimator
        .estimate_arrivals(&code)
        .await
        .map(Json)
        .map_err(estimate_error)
}
