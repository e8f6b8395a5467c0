//! Process-wide cached view of the upstream datasets.
//!
//! One [`TtlCache`] per dataset class, each with its own TTL. Every accessor
//! degrades instead of failing: a refresh error serves the last payload, or an
//! empty one when nothing was ever cached. The line and stop catalogs are
//! single-flight: concurrent callers share one download.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::cache::{Lookup, TtlCache};
use crate::config::CacheConfig;
use crate::models::{
    Line, LineSchedule, LineVariant, RouteTopology, Stop, StopCatalog, VehiclePosition,
};
use crate::providers::{SourceError, TransitSource};

/// Entry counts per dataset class
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StoreStatus {
    pub lines: usize,
    pub stops: usize,
    pub cached_topologies: usize,
    pub vehicle_feeds: usize,
    pub schedules: usize,
    pub variant_sets: usize,
}

pub struct TransitStore {
    source: Arc<dyn TransitSource>,
    lines: TtlCache<(), Arc<Vec<Line>>>,
    stops: TtlCache<(), Arc<StopCatalog>>,
    topologies: TtlCache<String, Arc<RouteTopology>>,
    vehicles: TtlCache<String, Arc<Vec<VehiclePosition>>>,
    schedules: TtlCache<String, Arc<LineSchedule>>,
    variants: TtlCache<String, Arc<Vec<LineVariant>>>,
    line_info: TtlCache<String, Arc<Value>>,
}

impl TransitStore {
    pub fn new(source: Arc<dyn TransitSource>, config: &CacheConfig) -> Self {
        Self {
            source,
            lines: TtlCache::single_flight(
                "lines",
                Duration::from_secs(config.line_catalog_ttl_secs),
            ),
            stops: TtlCache::single_flight(
                "stops",
                Duration::from_secs(config.stop_catalog_ttl_secs),
            ),
            topologies: TtlCache::new("topology", Duration::from_secs(config.topology_ttl_secs)),
            vehicles: TtlCache::new("vehicles", Duration::from_secs(config.vehicle_ttl_secs)),
            schedules: TtlCache::new("schedules", Duration::from_secs(config.schedule_ttl_secs)),
            variants: TtlCache::new("variants", Duration::from_secs(config.variant_ttl_secs)),
            line_info: TtlCache::new("line_info", Duration::from_secs(config.line_info_ttl_secs)),
        }
    }

    pub async fn lines(&self) -> Lookup<Arc<Vec<Line>>> {
        self.lines
            .get_or_refresh(&(), Utc::now(), Default::default, || async {
                self.source.fetch_lines().await.map(Arc::new)
            })
            .await
    }

    pub async fn stops(&self) -> Lookup<Arc<StopCatalog>> {
        self.stops
            .get_or_refresh(&(), Utc::now(), Default::default, || async {
                let stops = self.source.fetch_stops().await;
                stops.map(|stops| Arc::new(StopCatalog::new(stops)))
            })
            .await
    }

    /// Stop and route sequences for a line, populating the cache on demand
    pub async fn route_topology(&self, line: &str) -> Lookup<Arc<RouteTopology>> {
        let key = line.to_string();
        self.topologies
            .get_or_refresh(
                &key,
                Utc::now(),
                || {
                    Arc::new(RouteTopology {
                        line: line.to_string(),
                        ..RouteTopology::default()
                    })
                },
                || async {
                    let catalog = self.stops().await.value;
                    // Without stop coordinates the topology is useless for a whole TTL
                    if catalog.is_empty() {
                        return Err(SourceError::NetworkError(
                            "stop catalog unavailable".to_string(),
                        ));
                    }
                    self.source
                        .fetch_route_topology(line, &catalog)
                        .await
                        .map(Arc::new)
                },
            )
            .await
    }

    /// Cached topology for a line, if any, without refreshing
    pub async fn cached_topology(&self, line: &str) -> Option<Arc<RouteTopology>> {
        self.topologies.get(&line.to_string()).await
    }

    pub async fn topology_expired(&self, line: &str) -> bool {
        self.topologies.is_expired(&line.to_string(), Utc::now()).await
    }

    /// Topologies currently held by the cache, expired ones included, ordered
    /// by line code. Never touches the upstream.
    pub async fn cached_topologies(&self) -> Vec<Arc<RouteTopology>> {
        let mut cached = self.topologies.snapshot().await;
        cached.sort_by(|(a, _), (b, _)| a.cmp(b));
        cached.into_iter().map(|(_, topology)| topology).collect()
    }

    pub async fn vehicles(&self, line: &str) -> Lookup<Arc<Vec<VehiclePosition>>> {
        self.vehicles
            .get_or_refresh(&line.to_string(), Utc::now(), Default::default, || async {
                self.source.fetch_vehicle_positions(line).await.map(Arc::new)
            })
            .await
    }

    pub async fn schedule(&self, line: &str) -> Lookup<Arc<LineSchedule>> {
        self.schedules
            .get_or_refresh(
                &line.to_string(),
                Utc::now(),
                || {
                    Arc::new(LineSchedule {
                        line: line.to_string(),
                        ..LineSchedule::default()
                    })
                },
                || async { self.source.fetch_schedule(line).await.map(Arc::new) },
            )
            .await
    }

    pub async fn line_variants(&self, line: &str) -> Lookup<Arc<Vec<LineVariant>>> {
        self.variants
            .get_or_refresh(&line.to_string(), Utc::now(), Default::default, || async {
                self.source.fetch_line_variants(line).await.map(Arc::new)
            })
            .await
    }

    /// Line information card; `null` when the upstream has none to give
    pub async fn line_info(&self, line: &str) -> Lookup<Arc<Value>> {
        self.line_info
            .get_or_refresh(&line.to_string(), Utc::now(), Default::default, || async {
                self.source.fetch_line_info(line).await.map(Arc::new)
            })
            .await
    }

    /// Line suggestions, fetched per query and never cached
    pub async fn line_suggestions(&self, query: &str) -> Result<Value, SourceError> {
        self.source.fetch_line_suggestions(query).await
    }

    /// Case-insensitive substring search over stop codes and names
    pub async fn search_stops(&self, query: &str, limit: usize) -> Vec<Stop> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        self.stops().await.value.search(query, limit)
    }

    pub async fn status(&self) -> StoreStatus {
        StoreStatus {
            lines: self.lines.get(&()).await.map_or(0, |lines| lines.len()),
            stops: self.stops.get(&()).await.map_or(0, |catalog| catalog.len()),
            cached_topologies: self.topologies.len().await,
            vehicle_feeds: self.vehicles.len().await,
            schedules: self.schedules.len().await,
            variant_sets: self.variants.len().await,
        }
    }
}
