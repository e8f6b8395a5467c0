use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::geo;
use crate::models::{Direction, RouteTopology, VehiclePosition};

/// Live vehicle, placed on its direction's road geometry when the route is cached
#[derive(Debug, Serialize, ToSchema)]
pub struct TrackedVehicle {
    #[serde(flatten)]
    pub position: VehiclePosition,
    /// Meters travelled along the route geometry
    pub progress_m: Option<f64>,
    /// Distance from the route geometry, in meters
    pub off_route_m: Option<f64>,
    pub route_length_m: Option<f64>,
}

/// Vehicles sharing a direction tag and route variant
#[derive(Debug, Serialize, ToSchema)]
pub struct VariantSummary {
    /// Raw direction tag, empty when the vehicles carry none
    pub direction_code: String,
    pub direction: Option<Direction>,
    pub variant: String,
    /// First heading label seen for this variant
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VehiclesResponse {
    pub line: String,
    pub vehicles: Vec<TrackedVehicle>,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
    pub variants: Vec<VariantSummary>,
}

/// Live vehicle positions of a line
#[utoipa::path(
    get,
    path = "/api/lines/{code}/vehicles",
    params(
        ("code" = String, Path, description = "Line code, e.g. 34")
    ),
    responses(
        (status = 200, description = "Live vehicles, empty when the feed is unavailable", body = VehiclesResponse)
    ),
    tag = "lines"
)]
pub async fn get_vehicles(State(state): State<AppState>, Path(code): Path<String>) -> Json<VehiclesResponse> {
    let positions = state.store.vehicles(&code).await.value;
    let topology = state.store.cached_topology(&code).await;

    let vehicles: Vec<TrackedVehicle> = positions
        .iter()
        .map(|position| track(position, topology.as_deref()))
        .collect();
    let variants = summarize_variants(&positions);

    tracing::debug!(
        line = %code,
        vehicles = vehicles.len(),
        variants = variants.len(),
        "Returning live vehicles"
    );

    Json(VehiclesResponse {
        line: code,
        total: vehicles.len(),
        vehicles,
        timestamp: Utc::now(),
        variants,
    })
}

fn track(position: &VehiclePosition, topology: Option<&RouteTopology>) -> TrackedVehicle {
    let polyline = match (topology, position.direction) {
        (Some(topology), Some(direction)) if position.coordinate.is_known() => {
            Some(topology.direction(direction).polyline.as_slice())
        }
        _ => None,
    }
    .filter(|polyline| polyline.len() >= 2);

    let projection = polyline.map(|polyline| geo::project_onto_polyline(polyline, position.coordinate));

    TrackedVehicle {
        position: position.clone(),
        progress_m: projection.map(|p| p.progress.round()),
        off_route_m: projection.map(|p| p.distance.round()),
        route_length_m: polyline.map(|polyline| geo::polyline_length(polyline).round()),
    }
}

fn summarize_variants(positions: &[VehiclePosition]) -> Vec<VariantSummary> {
    let mut groups: BTreeMap<(String, String), VariantSummary> = BTreeMap::new();

    for position in positions {
        groups
            .entry((position.direction_code.clone(), position.variant.clone()))
            .and_modify(|summary| summary.count += 1)
            .or_insert_with(|| VariantSummary {
                direction_code: position.direction_code.clone(),
                direction: position.direction,
                variant: position.variant.clone(),
                label: position.heading_label.clone(),
                count: 1,
            });
    }

    groups.into_values().collect()
}
