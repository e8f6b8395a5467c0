//! Arrival estimation for a single stop.
//!
//! Only lines whose route topology is already cached are scanned. For each
//! line serving the stop, live vehicles heading the right way are snapped to
//! their nearest route stop, smoothed through the [`ProgressTracker`], and
//! converted to an ETA at a fixed average speed.

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::config::EstimatorConfig;
use crate::geo;
use crate::models::{ArrivalEstimate, ArrivalResult, Direction, RouteTopology, VehiclePosition};
use crate::store::TransitStore;
use crate::tracker::ProgressTracker;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EstimateError {
    #[error("Stop not found: {0}")]
    NotFound(String),
    #[error("Arrival estimate for stop {0} timed out")]
    Timeout(String),
}

/// A (line, direction) pair whose stop sequence contains the requested stop
struct Candidate {
    topology: Arc<RouteTopology>,
    direction: Direction,
    stop_index: usize,
}

pub struct ArrivalEstimator {
    store: Arc<TransitStore>,
    tracker: Arc<ProgressTracker>,
    speed_m_per_min: f64,
    adjacent_threshold_m: f64,
    max_results: usize,
    deadline: Duration,
}

impl ArrivalEstimator {
    pub fn new(
        store: Arc<TransitStore>,
        tracker: Arc<ProgressTracker>,
        config: &EstimatorConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            speed_m_per_min: config.speed_m_per_min,
            adjacent_threshold_m: config.adjacent_threshold_m,
            max_results: config.max_results,
            deadline: config.deadline(),
        }
    }

    /// Vehicles approaching `stop_code`, soonest first.
    ///
    /// Lines that fail to report vehicles contribute nothing. When the
    /// deadline passes while lines are still being evaluated, the arrivals
    /// gathered so far are returned with `partial` set.
    pub async fn estimate_arrivals(&self, stop_code: &str) -> Result<ArrivalResult, EstimateError> {
        let deadline = Instant::now() + self.deadline;

        let catalog = timeout_at(deadline, self.store.stops())
            .await
            .map_err(|_| EstimateError::Timeout(stop_code.to_string()))?
            .value;
        let stop = catalog
            .get(stop_code)
            .filter(|stop| stop.coordinate.is_known())
            .cloned()
            .ok_or_else(|| EstimateError::NotFound(stop_code.to_string()))?;

        let candidates = self.candidates(stop_code).await;
        let lines_checked = candidates.len();

        let now = Utc::now();
        let mut pending: FuturesUnordered<_> = candidates
            .into_iter()
            .map(|candidate| self.line_arrivals(candidate, now))
            .collect();

        let mut arrivals = Vec::new();
        let mut partial = false;
        loop {
            match timeout_at(deadline, pending.next()).await {
                Ok(Some(mut found)) => arrivals.append(&mut found),
                Ok(None) => break,
                Err(_) => {
                    partial = true;
                    warn!(
                        stop = %stop_code,
                        unfinished_lines = pending.len(),
                        collected = arrivals.len(),
                        "Arrival estimate deadline reached, returning partial results"
                    );
                    break;
                }
            }
        }

        arrivals.sort_by_key(|arrival: &ArrivalEstimate| arrival.eta_minutes.unwrap_or(u32::MAX));
        arrivals.truncate(self.max_results);

        debug!(
            stop = %stop_code,
            lines_checked,
            arrivals = arrivals.len(),
            partial,
            "Estimated arrivals"
        );

        Ok(ArrivalResult {
            stop,
            arrivals,
            lines_checked,
            partial,
        })
    }

    /// One candidate per cached line serving the stop. A line is matched in
    /// the first direction that contains the stop and not scanned further.
    async fn candidates(&self, stop_code: &str) -> Vec<Candidate> {
        self.store
            .cached_topologies()
            .await
            .into_iter()
            .filter_map(|topology| {
                Direction::ALL.into_iter().find_map(|direction| {
                    let stop_index = topology.direction(direction).position_of(stop_code)?;
                    Some(Candidate {
                        topology: Arc::clone(&topology),
                        direction,
                        stop_index,
                    })
                })
            })
            .collect()
    }

    async fn line_arrivals(&self, candidate: Candidate, now: DateTime<Utc>) -> Vec<ArrivalEstimate> {
        let line = candidate.topology.line.as_str();
        let lookup = self.store.vehicles(line).await;
        if lookup.status.is_failure() {
            debug!(line = %line, status = ?lookup.status, "Vehicle feed degraded for line");
        }

        lookup
            .value
            .iter()
            .filter(|vehicle| vehicle.may_travel(candidate.direction))
            .filter_map(|vehicle| self.estimate_vehicle(vehicle, &candidate, now))
            .collect()
    }

    fn estimate_vehicle(
        &self,
        vehicle: &VehiclePosition,
        candidate: &Candidate,
        now: DateTime<Utc>,
    ) -> Option<ArrivalEstimate> {
        if vehicle.vehicle_id.is_empty() || !vehicle.coordinate.is_known() {
            return None;
        }

        let route = candidate.topology.direction(candidate.direction);
        let (nearest, direct) = geo::nearest_point(
            route.stops.iter().map(|stop| stop.coordinate),
            vehicle.coordinate,
        )?;

        let smoothed = self
            .tracker
            .observe(&vehicle.vehicle_id, nearest as i64, now);
        if smoothed > candidate.stop_index as i64 {
            return None;
        }

        let from = usize::try_from(smoothed).unwrap_or(0);
        let between: f64 = route.stops[from..=candidate.stop_index]
            .windows(2)
            .filter_map(|pair| Some(geo::distance(pair[0].coordinate?, pair[1].coordinate?)))
            .sum();
        let distance_m = direct + between;

        Some(ArrivalEstimate {
            line: candidate.topology.line.clone(),
            vehicle_id: vehicle.vehicle_id.clone(),
            eta_minutes: self.eta_minutes(distance_m),
            distance_km: (distance_m / 100.0).round() / 10.0,
            direction: candidate.direction,
            direction_label: candidate.direction.label().to_string(),
            destination: vehicle.heading_label.clone(),
        })
    }

    /// Minutes at the average system speed. Anything farther than the
    /// adjacency threshold is at least one minute away.
    fn eta_minutes(&self, distance_m: f64) -> Option<u32> {
        if !distance_m.is_finite() || distance_m < 0.0 {
            return None;
        }
        let minutes = (distance_m / self.speed_m_per_min).round() as u32;
        if minutes == 0 && distance_m > self.adjacent_threshold_m {
            Some(1)
        } else {
            Some(minutes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, TrackerConfig};
    use crate::models::{Coordinate, RouteDirection, RouteStop, Stop};
    use crate::providers::mock::MockSource;

    // Meters per degree of latitude at the mean Earth radius
    const M_PER_DEG_LAT: f64 = geo::EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
    const BASE_LAT: f64 = 41.0;
    const BASE_LON: f64 = 29.0;

    /// Stops spaced 250 m apart going north
    fn stop_coordinate(index: usize) -> Coordinate {
        Coordinate::new(BASE_LAT + index as f64 * 250.0 / M_PER_DEG_LAT, BASE_LON)
    }

    /// Point `meters` due east of a stop
    fn east_of(index: usize, meters: f64) -> Coordinate {
        let stop = stop_coordinate(index);
        let m_per_deg_lon = M_PER_DEG_LAT * stop.lat.to_radians().cos();
        Coordinate::new(stop.lat, stop.lon + meters / m_per_deg_lon)
    }

    fn stop_code(line: &str, index: usize) -> String {
        if index == 12 {
            "133691".to_string()
        } else {
            format!("{line}-{index:02}")
        }
    }

    fn route(line: &str, count: usize) -> RouteDirection {
        RouteDirection {
            stops: (0..count)
                .map(|i| RouteStop {
                    sequence: i as u32 + 1,
                    code: stop_code(line, i),
                    name: format!("Stop {i}"),
                    coordinate: Some(stop_coordinate(i)),
                })
                .collect(),
            polyline: (0..count).map(stop_coordinate).collect(),
        }
    }

    fn catalog_stops(line: &str, count: usize) -> Vec<Stop> {
        (0..count)
            .map(|i| Stop {
                code: stop_code(line, i),
                name: format!("Stop {i}"),
                district: "Sisli".to_string(),
                coordinate: stop_coordinate(i),
                direction_hint: String::new(),
            })
            .collect()
    }

    fn vehicle(id: &str, coordinate: Coordinate, direction_code: &str) -> VehiclePosition {
        VehiclePosition {
            vehicle_id: id.to_string(),
            coordinate,
            direction_code: direction_code.to_string(),
            direction: Direction::from_code(direction_code),
            variant: "D0".to_string(),
            route_code: format!("34_{direction_code}_D0"),
            heading_label: "ZINCIRLIKUYU".to_string(),
        }
    }

    struct Fixture {
        source: Arc<MockSource>,
        store: Arc<TransitStore>,
        estimator: ArrivalEstimator,
    }

    /// Line "34" with 20 outbound stops; stop 133691 sits at index 12
    fn fixture() -> Fixture {
        fixture_with(EstimatorConfig::default())
    }

    fn fixture_with(config: EstimatorConfig) -> Fixture {
        let source = Arc::new(MockSource::new());
        source.set_stops(catalog_stops("34", 20));
        source.set_topology(RouteTopology {
            line: "34".to_string(),
            outbound: route("34", 20),
            inbound: RouteDirection::default(),
        });

        let store = Arc::new(TransitStore::new(source.clone(), &CacheConfig::default()));
        let tracker = Arc::new(ProgressTracker::new(&TrackerConfig::default()).unwrap());
        let estimator = ArrivalEstimator::new(store.clone(), tracker, &config);
        Fixture {
            source,
            store,
            estimator,
        }
    }

    #[tokio::test]
    async fn test_vehicle_two_stops_away() {
        let fx = fixture();
        fx.store.route_topology("34").await;
        fx.source.set_vehicles(
            "34",
            vec![vehicle("C-1", east_of(10, 100.0), "G")],
        );

        let result = fx.estimator.estimate_arrivals("133691").await.unwrap();
        assert_eq!(result.stop.code, "133691");
        assert_eq!(result.lines_checked, 1);
        assert!(!result.partial);
        assert_eq!(result.arrivals.len(), 1);

        let arrival = &result.arrivals[0];
        assert_eq!(arrival.line, "34");
        assert_eq!(arrival.vehicle_id, "C-1");
        // 100 m offset plus two 250 m hops
        assert_eq!(arrival.eta_minutes, Some(2));
        assert_eq!(arrival.distance_km, 0.6);
        assert_eq!(arrival.direction, Direction::Outbound);
        assert_eq!(arrival.direction_label, "Outbound");
        assert_eq!(arrival.destination, "ZINCIRLIKUYU");
    }

    #[tokio::test]
    async fn test_vehicle_at_the_stop_is_not_clamped() {
        let fx = fixture();
        fx.store.route_topology("34").await;
        fx.source
            .set_vehicles("34", vec![vehicle("C-1", east_of(12, 30.0), "")]);

        let result = fx.estimator.estimate_arrivals("133691").await.unwrap();
        assert_eq!(result.arrivals[0].eta_minutes, Some(0));
    }

    #[tokio::test]
    async fn test_vehicle_just_beyond_adjacency_is_one_minute() {
        let fx = fixture();
        fx.store.route_topology("34").await;
        fx.source
            .set_vehicles("34", vec![vehicle("C-1", east_of(12, 60.0), "")]);

        let result = fx.estimator.estimate_arrivals("133691").await.unwrap();
        assert_eq!(result.arrivals[0].eta_minutes, Some(1));
    }

    #[tokio::test]
    async fn test_passed_and_opposite_vehicles_are_filtered() {
        let fx = fixture();
        fx.store.route_topology("34").await;
        fx.source.set_vehicles(
            "34",
            vec![
                vehicle("passed", east_of(14, 10.0), "G"),
                vehicle("opposite", east_of(8, 10.0), "D"),
                vehicle("no-fix", Coordinate::default(), ""),
                vehicle("coming", east_of(8, 10.0), ""),
            ],
        );

        let result = fx.estimator.estimate_arrivals("133691").await.unwrap();
        let ids: Vec<&str> = result.arrivals.iter().map(|a| a.vehicle_id.as_str()).collect();
        assert_eq!(ids, vec!["coming"]);
    }

    #[tokio::test]
    async fn test_arrivals_are_sorted_and_truncated() {
        let fx = fixture();
        fx.store.route_topology("34").await;
        let vehicles = (0..25)
            .map(|i| vehicle(&format!("C-{i:02}"), east_of(i % 12, 20.0 + i as f64), ""))
            .collect();
        fx.source.set_vehicles("34", vehicles);

        let result = fx.estimator.estimate_arrivals("133691").await.unwrap();
        assert_eq!(result.arrivals.len(), 20);
        let etas: Vec<u32> = result
            .arrivals
            .iter()
            .map(|a| a.eta_minutes.unwrap())
            .collect();
        assert!(etas.windows(2).all(|pair| pair[0] <= pair[1]), "{etas:?}");
    }

    #[tokio::test]
    async fn test_cold_lines_are_skipped() {
        let fx = fixture();
        fx.source
            .set_vehicles("34", vec![vehicle("C-1", east_of(10, 10.0), "")]);

        let result = fx.estimator.estimate_arrivals("133691").await.unwrap();
        assert_eq!(result.lines_checked, 0);
        assert!(result.arrivals.is_empty());
        assert_eq!(MockSource::calls(&fx.source.topology_calls), 0);
        assert_eq!(MockSource::calls(&fx.source.vehicle_calls), 0);
    }

    #[tokio::test]
    async fn test_unknown_stop_is_not_found() {
        let fx = fixture();
        assert_eq!(
            fx.estimator.estimate_arrivals("999999").await.unwrap_err(),
            EstimateError::NotFound("999999".to_string())
        );
    }

    #[tokio::test]
    async fn test_failing_vehicle_feed_yields_empty_arrivals() {
        let fx = fixture();
        fx.store.route_topology("34").await;
        fx.source.fail_line("34");

        let result = fx.estimator.estimate_arrivals("133691").await.unwrap();
        assert_eq!(result.lines_checked, 1);
        assert!(result.arrivals.is_empty());
    }

    #[tokio::test]
    async fn test_small_backward_jump_is_held() {
        let fx = fixture();
        let cache = CacheConfig {
            vehicle_ttl_secs: 0,
            ..CacheConfig::default()
        };
        let store = Arc::new(TransitStore::new(fx.source.clone(), &cache));
        store.route_topology("34").await;
        let estimator = ArrivalEstimator::new(
            store,
            Arc::new(ProgressTracker::new(&TrackerConfig::default()).unwrap()),
            &EstimatorConfig::default(),
        );

        fx.source
            .set_vehicles("34", vec![vehicle("C-1", east_of(10, 0.0), "")]);
        let first = estimator.estimate_arrivals("133691").await.unwrap();
        assert_eq!(first.arrivals[0].eta_minutes, Some(2));

        // GPS jitter snaps the vehicle back to stop 9; progress is held at 10
        fx.source
            .set_vehicles("34", vec![vehicle("C-1", east_of(9, 0.0), "")]);
        let second = estimator.estimate_arrivals("133691").await.unwrap();
        assert_eq!(second.arrivals[0].eta_minutes, Some(2));
        assert_eq!(second.arrivals[0].distance_km, 0.5);
    }

    #[tokio::test]
    async fn test_unrecognised_direction_tag_is_not_matched() {
        let fx = fixture();
        fx.store.route_topology("34").await;
        fx.source.set_vehicles(
            "34",
            vec![
                vehicle("garage", east_of(10, 10.0), "X"),
                vehicle("untagged", east_of(10, 10.0), ""),
            ],
        );

        let result = fx.estimator.estimate_arrivals("133691").await.unwrap();
        let ids: Vec<&str> = result.arrivals.iter().map(|a| a.vehicle_id.as_str()).collect();
        assert_eq!(ids, vec!["untagged"]);
    }

    #[tokio::test]
    async fn test_line_is_matched_in_its_first_direction_only() {
        let fx = fixture();
        let mut inbound = route("34", 20);
        inbound.stops.reverse();
        inbound.polyline.reverse();
        fx.source.set_topology(RouteTopology {
            line: "34".to_string(),
            outbound: route("34", 20),
            inbound,
        });
        fx.store.route_topology("34").await;

        // Inbound the stop sits at index 7 and stop 15 comes before it
        fx.source.set_vehicles(
            "34",
            vec![
                vehicle("out", east_of(10, 10.0), "G"),
                vehicle("in", east_of(15, 10.0), "D"),
            ],
        );

        let result = fx.estimator.estimate_arrivals("133691").await.unwrap();
        assert_eq!(result.lines_checked, 1);
        assert_eq!(result.arrivals.len(), 1);
        assert_eq!(result.arrivals[0].vehicle_id, "out");
        assert_eq!(result.arrivals[0].direction, Direction::Outbound);
        assert_eq!(MockSource::calls(&fx.source.vehicle_calls), 1);
    }

    #[tokio::test]
    async fn test_deadline_returns_partial_results() {
        let fx = fixture_with(EstimatorConfig {
            deadline_ms: 100,
            ..EstimatorConfig::default()
        });
        fx.source.set_topology(RouteTopology {
            line: "500T".to_string(),
            outbound: route("500T", 20),
            inbound: RouteDirection::default(),
        });
        fx.store.route_topology("34").await;
        fx.store.route_topology("500T").await;

        fx.source
            .set_vehicles("34", vec![vehicle("C-1", east_of(10, 100.0), "G")]);
        fx.source
            .set_vehicles("500T", vec![vehicle("B-1", east_of(11, 10.0), "G")]);
        fx.source
            .set_vehicle_delay("500T", Duration::from_millis(1_000));

        let started = std::time::Instant::now();
        let result = fx.estimator.estimate_arrivals("133691").await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(900));
        assert!(result.partial);
        assert_eq!(result.lines_checked, 2);
        let ids: Vec<&str> = result.arrivals.iter().map(|a| a.vehicle_id.as_str()).collect();
        assert_eq!(ids, vec!["C-1"]);
    }

    #[tokio::test]
    async fn test_slow_stop_catalog_times_out() {
        let fx = fixture_with(EstimatorConfig {
            deadline_ms: 50,
            ..EstimatorConfig::default()
        });
        fx.source.set_catalog_delay(Duration::from_millis(500));

        assert_eq!(
            fx.estimator.estimate_arrivals("133691").await.unwrap_err(),
            EstimateError::Timeout("133691".to_string())
        );
    }

    #[test]
    fn test_eta_minutes() {
        let fx = fixture();
        assert_eq!(fx.estimator.eta_minutes(600.0), Some(2));
        assert_eq!(fx.estimator.eta_minutes(40.0), Some(0));
        assert_eq!(fx.estimator.eta_minutes(60.0), Some(1));
        assert_eq!(fx.estimator.eta_minutes(f64::INFINITY), "");
    }
}
