use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::error::{not_found, upstream_unavailable};
use crate::api::{ApiError, AppState, ErrorResponse};
use crate::cache::LookupStatus;
use crate::models::LineVariant;

#[derive(Debug, Serialize, ToSchema)]
pub struct VariantListing {
    pub code: String,
    pub label: String,
    pub stop_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LineVariantsResponse {
    pub line: String,
    pub variants: Vec<VariantListing>,
}

/// Route variants of a line
#[utoipa::path(
    get,
    path = "/api/lines/{code}/variants",
    params(
        ("code" = String, Path, description = "Line code, e.g. 34")
    ),
    responses(
        (status = 200, description = "Route variants in upstream order", body = LineVariantsResponse),
        (status = 503, description = "Variant source unavailable", body = ErrorResponse)
    ),
    tag = "lines"
)]
pub async fn list_variants(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<LineVariantsResponse>, ApiError> {
    let lookup = state.store.line_variants(&code).await;
    if let LookupStatus::UpstreamUnavailable { error } = lookup.status {
        return Err(upstream_unavailable(format!(
            "Variants for line {} unavailable: {}",
            code, error
        )));
    }

    let variants = lookup
        .value
        .iter()
        .map(|variant| VariantListing {
            code: variant.code.clone(),
            label: variant.label.clone(),
            stop_count: variant.stops.len(),
        })
        .collect();

    Ok(Json(LineVariantsResponse {
        line: code,
        variants,
    }))
}

/// Stops and geometry of one route variant
#[utoipa::path(
    get,
    path = "/api/lines/{code}/variants/{variant}",
    params(
        ("code" = String, Path, description = "Line code, e.g. 34"),
        ("variant" = String, Path, description = "Variant code, e.g. 34_G_D0")
    ),
    responses(
        (status = 200, description = "Variant stops and polyline", body = LineVariant),
        (status = 404, description = "Line has no such variant", body = ErrorResponse),
        (status = 503, description = "Variant source unavailable", body = ErrorResponse)
    ),
    tag = "lines"
)]
pub async fn get_variant(
    State(state): State<AppState>,
    Path((code, variant)): Path<(String, String)>,
) -> Result<Json<LineVariant>, ApiError> {
    let lookup = state.store.line_variants(&code).await;
    if let LookupStatus::UpstreamUnavailable { error } = lookup.status {
        return Err(upstream_unavailable(format!(
            "Variants for line {} unavailable: {}",
            code, error
        )));
    }

    lookup
        .value
        .iter()
        .find(|candidate| candidate.code == variant)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(format!("Line {} has no variant {}", code, variant)))
}
