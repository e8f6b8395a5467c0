//! In-memory [`TransitSource`] for tests.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{SourceError, SourceFuture, TransitSource};
use crate::models::{
    Line, LineSchedule, LineVariant, RouteTopology, Stop, StopCatalog, VehiclePosition,
};

#[derive(Default)]
pub struct MockSource {
    lines: Mutex<Vec<Line>>,
    stops: Mutex<Vec<Stop>>,
    topologies: Mutex<HashMap<String, RouteTopology>>,
    vehicles: Mutex<HashMap<String, Vec<VehiclePosition>>>,
    schedules: Mutex<HashMap<String, LineSchedule>>,
    variants: Mutex<HashMap<String, Vec<LineVariant>>>,
    line_info: Mutex<HashMap<String, Value>>,
    suggestions: Mutex<Value>,
    failing_lines: Mutex<HashSet<String>>,
    fail_catalogs: Mutex<bool>,
    catalog_delay: Mutex<Option<Duration>>,
    topology_delay: Mutex<Option<Duration>>,
    vehicle_delays: Mutex<HashMap<String, Duration>>,
    pub line_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub topology_calls: AtomicUsize,
    pub vehicle_calls: AtomicUsize,
    pub schedule_calls: AtomicUsize,
    pub variant_calls: AtomicUsize,
    pub info_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lines(&self, lines: Vec<Line>) {
        *self.lines.lock().unwrap() = lines;
    }

    pub fn set_stops(&self, stops: Vec<Stop>) {
        *self.stops.lock().unwrap() = stops;
    }

    pub fn set_topology(&self, topology: RouteTopology) {
        self.topologies
            .lock()
            .unwrap()
            .insert(topology.line.clone(), topology);
    }

    pub fn set_vehicles(&self, line: &str, vehicles: Vec<VehiclePosition>) {
        self.vehicles
            .lock()
            .unwrap()
            .insert(line.to_string(), vehicles);
    }

    pub fn set_schedule(&self, schedule: LineSchedule) {
        self.schedules
            .lock()
            .unwrap()
            .insert(schedule.line.clone(), schedule);
    }

    pub fn set_variants(&self, line: &str, variants: Vec<LineVariant>) {
        self.variants
            .lock()
            .unwrap()
            .insert(line.to_string(), variants);
    }

    pub fn set_line_info(&self, line: &str, info: Value) {
        self.line_info.lock().unwrap().insert(line.to_string(), info);
    }

    pub fn set_suggestions(&self, suggestions: Value) {
        *self.suggestions.lock().unwrap() = suggestions;
    }

    /// Every per-line fetch for `line` fails with a network error
    pub fn fail_line(&self, line: &str) {
        self.failing_lines.lock().unwrap().insert(line.to_string());
    }

    pub fn recover_line(&self, line: &str) {
        self.failing_lines.lock().unwrap().remove(line);
    }

    /// Line and stop catalog fetches fail
    pub fn fail_catalogs(&self, fail: bool) {
        *self.fail_catalogs.lock().unwrap() = fail;
    }

    /// Line and stop catalog fetches sleep this long before answering
    pub fn set_catalog_delay(&self, delay: Duration) {
        *self.catalog_delay.lock().unwrap() = Some(delay);
    }

    /// Vehicle fetches for `line` sleep this long before answering
    pub fn set_vehicle_delay(&self, line: &str, delay: Duration) {
        self.vehicle_delays
            .lock()
            .unwrap()
            .insert(line.to_string(), delay);
    }

    /// Topology fetches sleep this long before answering
    pub fn set_topology_delay(&self, delay: Duration) {
        *self.topology_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn check_line(&self, line: &str) -> Result<(), SourceError> {
        if self.failing_lines.lock().unwrap().contains(line) {
            Err(SourceError::NetworkError(format!("line {line} unavailable")))
        } else {
            Ok(())
        }
    }

    async fn catalog_pause(&self) {
        let delay = *self.catalog_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_catalogs(&self) -> Result<(), SourceError> {
        if *self.fail_catalogs.lock().unwrap() {
            Err(SourceError::HttpStatus {
                status: 503,
                url: "mock://catalog".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl TransitSource for MockSource {
    fn fetch_lines(&self) -> SourceFuture<'_, Vec<Line>> {
        Box::pin(async move {
            self.line_calls.fetch_add(1, Ordering::SeqCst);
            self.catalog_pause().await;
            self.check_catalogs()?;
            Ok(self.lines.lock().unwrap().clone())
        })
    }

    fn fetch_stops(&self) -> SourceFuture<'_, Vec<Stop>> {
        Box::pin(async move {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            self.catalog_pause().await;
            self.check_catalogs()?;
            Ok(self.stops.lock().unwrap().clone())
        })
    }

    fn fetch_route_topology<'a>(
        &'a self,
        line: &'a str,
        _stops: &'a StopCatalog,
    ) -> SourceFuture<'a, RouteTopology> {
        Box::pin(async move {
            self.topology_calls.fetch_add(1, Ordering::SeqCst);
            let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

            let delay = *self.topology_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.check_line(line)?;
            Ok(self
                .topologies
                .lock()
                .unwrap()
                .get(line)
                .cloned()
                .unwrap_or_else(|| RouteTopology {
                    line: line.to_string(),
                    ..RouteTopology::default()
                }))
        })
    }

    fn fetch_vehicle_positions<'a>(&'a self, line: &'a str) -> SourceFuture<'a, Vec<VehiclePosition>> {
        Box::pin(async move {
            self.vehicle_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.vehicle_delays.lock().unwrap().get(line).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.check_line(line)?;
            Ok(self
                .vehicles
                .lock()
                .unwrap()
                .get(line)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn fetch_schedule<'a>(&'a self, line: &'a str) -> SourceFuture<'a, LineSchedule> {
        Box::pin(async move {
            self.schedule_calls.fetch_add(1, Ordering::SeqCst);
            self.check_line(line)?;
            Ok(self
                .schedules
                .lock()
                .unwrap()
                .get(line)
                .cloned()
                .unwrap_or_else(|| LineSchedule {
                    line: line.to_string(),
                    ..LineSchedule::default()
                }))
        })
    }

    fn fetch_line_variants<'a>(&'a self, line: &'a str) -> SourceFuture<'a, Vec<LineVariant>> {
        Box::pin(async move {
            self.variant_calls.fetch_add(1, Ordering::SeqCst);
            self.check_line(line)?;
            Ok(self
                .variants
                .lock()
                .unwrap()
                .get(line)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn fetch_line_info<'a>(&'a self, line: &'a str) -> SourceFuture<'a, Value> {
        Box::pin(async move {
            self.info_calls.fetch_add(1, Ordering::SeqCst);
            self.check_line(line)?;
            Ok(self
                .line_info
                .lock()
                .unwrap()
                .get(line)
                .cloned()
                .unwrap_or(Value::Null))
        })
    }

    fn fetch_line_suggestions<'a>(&'a self, _query: &'a str) -> SourceFuture<'a, Value> {
        Box::pin(async move {
            self.check_catalogs()?;
            Ok(self.suggestions.lock().unwrap().clone())
        })
    }
}
