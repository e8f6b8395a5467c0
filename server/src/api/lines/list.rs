use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::api::error::{not_found, upstream_unavailable};
use crate::api::{ApiError, AppState, ErrorResponse};
use crate::cache::LookupStatus;
use crate::models::{Line, LineSchedule, RouteTopology};

#[derive(Debug, Serialize, ToSchema)]
pub struct LineListResponse {
    pub lines: Vec<Line>,
    pub total: usize,
}

/// Route topology plus the line information card
#[derive(Debug, Serialize, ToSchema)]
pub struct RouteResponse {
    #[serde(flatten)]
    pub topology: RouteTopology,
    /// Operator, fare and notice details as published upstream; `null` when unavailable
    pub info: Value,
}

/// List every line in the catalog
#[utoipa::path(
    get,
    path = "/api/lines",
    responses(
        (status = 200, description = "Line catalog", body = LineListResponse),
        (status = 503, description = "Line catalog unavailable", body = ErrorResponse)
    ),
    tag = "lines"
)]
pub async fn list_lines(State(state): State<AppState>) -> Result<Json<LineListResponse>, ApiError> {
    let lookup = state.store.lines().await;
    if let LookupStatus::UpstreamUnavailable { error } = lookup.status {
        return Err(upstream_unavailable(format!("Line catalog unavailable: {}", error)));
    }

    let lines = lookup.value.as_ref().clone();
    Ok(Json(LineListResponse {
        total: lines.len(),
        lines,
    }))
}

/// Stop sequences and road geometry of a line, both directions
#[utoipa::path(
    get,
    path = "/api/lines/{code}/route",
    params(
        ("code" = String, Path, description = "Line code, e.g. 34")
    ),
    responses(
        (status = 200, description = "Route topology and line information", body = RouteResponse),
        (status = 404, description = "Line has no route", body = ErrorResponse),
        (status = 503, description = "Route source unavailable", body = ErrorResponse)
    ),
    tag = "lines"
)]
pub async fn get_route(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RouteResponse>, ApiError> {
    let (lookup, info) = tokio::join!(state.store.route_topology(&code), state.store.line_info(&code));
    if let LookupStatus::UpstreamUnavailable { error } = lookup.status {
        return Err(upstream_unavailable(format!("Route for line {} unavailable: {}", code, error)));
    }
    if lookup.value.is_empty() {
        return Err(not_found(format!("No route found for line {}", code)));
    }

    Ok(Json(RouteResponse {
        topology: lookup.value.as_ref().clone(),
        info: info.value.as_ref().clone(),
    }))
}

/// Planned departures grouped by day type and direction
#[utoipa::path(
    get,
    path = "/api/lines/{code}/schedule",
    params(
        ("code" = String, Path, description = "Line code, e.g. 34")
    ),
    responses(
        (status = 200, description = "Line schedule", body = LineSchedule),
        (status = 503, description = "Schedule source unavailable", body = ErrorResponse)
    ),
    tag = "lines"
)]
pub async fn get_schedule(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<LineSchedule>, ApiError> {
    let lookup = state.store.schedule(&code).await;
    if let LookupStatus::UpstreamUnavailable { error } = lookup.status {
        return Err(upstream_unavailable(format!(
            "Schedule for line {} unavailable: {}",
            code, error
        )));
    }

    Ok(Json(lookup.value.as_ref().clone()))
}
