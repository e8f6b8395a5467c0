pub mod error;
pub mod lines;
pub mod status;
pub mod stops;

pub use error::{ApiError, ErrorResponse};

use axum::Router;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::estimator::ArrivalEstimator;
use crate::store::TransitStore;
use crate::tracker::ProgressTracker;

/// Shared handles every handler reads from
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TransitStore>,
    pub tracker: Arc<ProgressTracker>,
    pub estimator: Arc<ArrivalEstimator>,
    pub search_limit: usize,
}

#[derive(OpenApi)]
#[openapi(
    components(schemas(
        ErrorResponse,
        crate::models::Coordinate,
        crate::models::Direction,
        crate::models::Line,
        crate::models::Stop,
        crate::models::RouteStop,
        crate::models::RouteDirection,
        crate::models::RouteTopology,
        crate::models::VehiclePosition,
        crate::models::DayType,
        crate::models::ScheduledDeparture,
        crate::models::LineSchedule,
        crate::models::LineVariant,
        crate::models::ArrivalEstimate,
        crate::models::ArrivalResult,
        crate::store::StoreStatus,
        lines::list::LineListResponse,
        lines::list::RouteResponse,
        lines::suggestions::LineSuggestionsResponse,
        lines::variants::LineVariantsResponse,
        lines::variants::VariantListing,
        lines::vehicles::VehiclesResponse,
        lines::vehicles::TrackedVehicle,
        lines::vehicles::VariantSummary,
        stops::search::StopSearchResponse,
        status::StatusResponse,
    )),
    tags(
        (name = "lines", description = "Line catalog, routes, live vehicles and schedules"),
        (name = "stops", description = "Stop search and arrival estimates"),
        (name = "status", description = "Cache and tracker counters")
    )
)]
pub struct ApiDoc;

/// API routes together with the OpenAPI document collected from them
pub fn router(state: AppState) -> (Router, utoipa::openapi::OpenApi) {
    OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(lines::router())
        .merge(stops::router())
        .merge(status::router())
        .with_state(state)
        .split_for_parts()
}
