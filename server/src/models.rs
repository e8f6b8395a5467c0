use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use utoipa::ToSchema;

/// WGS84 coordinate. The upstream reports unknown positions as (0, 0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_known(&self) -> bool {
        self.lat != 0.0 && self.lon != 0.0 && self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Travel direction of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Direction {
    #[serde(rename = "G")]
    Outbound,
    #[serde(rename = "D")]
    Inbound,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Outbound, Direction::Inbound];

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "G" => Some(Direction::Outbound),
            "D" => Some(Direction::Inbound),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Direction::Outbound => "Outbound",
            Direction::Inbound => "Inbound",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Line {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Stop {
    pub code: String,
    pub name: String,
    pub district: String,
    pub coordinate: Coordinate,
    /// Free-form heading hint from the stop catalog
    pub direction_hint: String,
}

/// Stop catalog with a code index for O(1) lookups
#[derive(Debug, Clone, Default)]
pub struct StopCatalog {
    stops: Vec<Stop>,
    by_code: HashMap<String, usize>,
}

impl StopCatalog {
    /// Indexes `stops` by code. A duplicated code resolves to its first record.
    pub fn new(stops: Vec<Stop>) -> Self {
        let mut by_code = HashMap::with_capacity(stops.len());
        for (i, stop) in stops.iter().enumerate() {
            by_code.entry(stop.code.clone()).or_insert(i);
        }
        Self { stops, by_code }
    }

    pub fn get(&self, code: &str) -> Option<&Stop> {
        self.by_code.get(code).map(|&i| &self.stops[i])
    }

    pub fn coordinate(&self, code: &str) -> Option<Coordinate> {
        self.get(code)
            .map(|stop| stop.coordinate)
            .filter(Coordinate::is_known)
    }

    /// Case-insensitive substring match on code or name, in catalog order
    pub fn search(&self, query: &str, limit: usize) -> Vec<Stop> {
        let query = query.trim().to_lowercase();
        self.stops
            .iter()
            .filter(|stop| {
                stop.code.to_lowercase().contains(&query) || stop.name.to_lowercase().contains(&query)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

/// A stop as it appears in a route's ordered stop sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RouteStop {
    /// Sequence number printed by the upstream (1-based)
    pub sequence: u32,
    pub code: String,
    pub name: String,
    pub coordinate: Option<Coordinate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RouteDirection {
    /// Authoritative travel order
    pub stops: Vec<RouteStop>,
    /// Road geometry; more detailed than the stop list, not stop-aligned
    pub polyline: Vec<Coordinate>,
}

impl RouteDirection {
    pub fn position_of(&self, stop_code: &str) -> Option<usize> {
        self.stops.iter().position(|stop| stop.code == stop_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RouteTopology {
    pub line: String,
    pub outbound: RouteDirection,
    pub inbound: RouteDirection,
}

impl RouteTopology {
    pub fn direction(&self, direction: Direction) -> &RouteDirection {
        match direction {
            Direction::Outbound => &self.outbound,
            Direction::Inbound => &self.inbound,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.stops.is_empty() && self.inbound.stops.is_empty()
    }
}

/// Live vehicle ping as reported by the upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VehiclePosition {
    /// Door code painted on the vehicle
    pub vehicle_id: String,
    pub coordinate: Coordinate,
    /// Raw direction tag from the route-variant code, empty when it carries none
    pub direction_code: String,
    pub direction: Option<Direction>,
    pub variant: String,
    /// Route-variant code the direction and variant were parsed from
    pub route_code: String,
    /// Raw heading label, usually the destination
    pub heading_label: String,
}

impl VehiclePosition {
    /// Whether the vehicle may be travelling in `direction`: its tag names
    /// that direction, or it carries no tag at all. An unrecognised tag
    /// matches neither direction.
    pub fn may_travel(&self, direction: Direction) -> bool {
        match self.direction {
            Some(tagged) => tagged == direction,
            None => self.direction_code.is_empty(),
        }
    }
}

/// Splits a route-variant code such as `34_G_D0` into its raw direction tag
/// and variant tag.
pub fn parse_route_variant(route_code: &str) -> (String, String) {
    let parts: Vec<&str> = route_code.split('_').collect();
    if parts.len() >= 3 {
        let variant = parts[parts.len() - 1].to_string();
        let direction_code = parts[parts.len() - 2].to_string();
        return (direction_code, variant);
    }

    let direction_code = if route_code.contains("_G_") {
        "G"
    } else if route_code.contains("_D_") {
        "D"
    } else {
        ""
    };
    (direction_code.to_string(), String::new())
}

/// One route variant of a line with its own stop list and geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LineVariant {
    /// Variant code such as `34_G_D0`
    pub code: String,
    pub label: String,
    pub stops: Vec<RouteStop>,
    pub polyline: Vec<Coordinate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum DayType {
    #[serde(rename = "I")]
    Weekday,
    #[serde(rename = "C")]
    Saturday,
    #[serde(rename = "P")]
    Sunday,
}

impl DayType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "I" => Some(DayType::Weekday),
            "C" => Some(DayType::Saturday),
            "P" => Some(DayType::Sunday),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScheduledDeparture {
    pub variant: String,
    /// Departure time as printed upstream (`HH:MM`)
    pub time: String,
}

/// Planned departures grouped by day type and direction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LineSchedule {
    pub line: String,
    pub departures: BTreeMap<DayType, BTreeMap<Direction, Vec<ScheduledDeparture>>>,
}

impl LineSchedule {
    pub fn departures_for(&self, day: DayType, direction: Direction) -> &[ScheduledDeparture] {
        self.departures
            .get(&day)
            .and_then(|by_direction| by_direction.get(&direction))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// One vehicle's projected arrival at a stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ArrivalEstimate {
    pub line: String,
    pub vehicle_id: String,
    pub eta_minutes: Option<u32>,
    pub distance_km: f64,
    pub direction: Direction,
    pub direction_label: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArrivalResult {
    pub stop: Stop,
    pub arrivals: Vec<ArrivalEstimate>,
    /// Distinct lines whose cached topology contains the stop
    pub lines_checked: usize,
    /// True when the deadline cut the line scan short
    pub partial: bool,
}
