pub mod arrivals;
pub mod search;

use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::AppState;

pub fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(search::search_stops))
        .routes(routes!(arrivals::get_arrivals))
}
