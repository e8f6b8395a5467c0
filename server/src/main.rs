mod api;
mod cache;
mod config;
mod estimator;
mod geo;
mod models;
mod prefetch;
mod providers;
mod store;
mod tracker;

use axum::http::{HeaderValue, Method, header};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa_swagger_ui::SwaggerUi;

use api::AppState;
use config::{Config, ServerConfig};
use estimator::ArrivalEstimator;
use prefetch::Prefetcher;
use providers::{IettClient, TransitSource};
use store::TransitStore;
use tracker::ProgressTracker;

const CONFIG_ENV: &str = "TRANSIT_ETA_CONFIG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transit_eta=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting arrival estimation server");

    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.yaml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        info!(path = %config_path, "Loading configuration");
        Config::load(&config_path)?
    } else {
        info!(path = %config_path, "No configuration file, using defaults");
        Config::default()
    };

    let source: Arc<dyn TransitSource> = Arc::new(IettClient::new(&config.upstream)?);
    let store = Arc::new(TransitStore::new(source, &config.cache));
    let tracker = Arc::new(ProgressTracker::new(&config.tracker)?);
    let estimator = Arc::new(ArrivalEstimator::new(
        Arc::clone(&store),
        Arc::clone(&tracker),
        &config.estimator,
    ));

    // Warm the stop catalog so the first arrival request does not pay for it
    let warm_store = Arc::clone(&store);
    tokio::spawn(async move {
        let catalog = warm_store.stops().await;
        info!(
            stops = catalog.value.len(),
            status = ?catalog.status,
            "Stop catalog warmup finished"
        );
    });

    if config.prefetch.enabled {
        let prefetcher = Arc::new(Prefetcher::new(
            Arc::clone(&store),
            &config.prefetch,
            Duration::from_secs(config.cache.line_catalog_ttl_secs),
        ));
        tokio::spawn(prefetcher.start());
    } else {
        warn!("Topology prefetch disabled, arrivals only cover routes requested explicitly");
    }

    let state = AppState {
        store,
        tracker,
        estimator,
        search_limit: config.search.max_results,
    };

    // Build router
    let (api, openapi) = api::router(state);
    let app = api
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.server));

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!(address = %config.server.bind_address, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    if config.cors_permissive {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    cors.allow_origin(origins)
}
