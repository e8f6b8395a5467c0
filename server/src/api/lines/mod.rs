pub mod list;
pub mod suggestions;
pub mod variants;
pub mod vehicles;

use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::AppState;

pub fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list::list_lines))
        .routes(routes!(suggestions::suggest_lines))
        .routes(routes!(list::get_route))
        .routes(routes!(list::get_schedule))
        .routes(routes!(vehicles::get_vehicles))
        .routes(routes!(variants::list_variants))
        .routes(routes!(variants::get_variant))
}
