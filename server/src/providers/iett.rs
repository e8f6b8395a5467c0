//! IETT (Istanbul public buses) upstream client
//!
//! Static catalogs come from the IBB SOAP services, live vehicles and route
//! station pages from a JSON/HTML proxy, and road geometry from OSRM.
//!
//! # SOAP services
//!
//! Base: `https://api.ibb.gov.tr/iett`
//!
//! | Service path                              | Method                          | Parameter  |
//! |-------------------------------------------|---------------------------------|------------|
//! | `UlasimAnaVeri/HatDurakGuzergah.asmx`     | `GetHat_json`                   | `HatKodu`  |
//! | `UlasimAnaVeri/HatDurakGuzergah.asmx`     | `GetDurak_json`                 | `DurakKodu`|
//! | `UlasimAnaVeri/PlanlananSeferSaati.asmx`  | `GetPlanlananSeferSaati_json`   | `HatKodu`  |
//!
//! An empty parameter returns the whole catalog. The response is a SOAP 1.1
//! envelope whose `{Method}Result` element carries an XML-escaped JSON array.
//! A response without that element is treated as a failed call.
//!
//! ## Record fields
//! - Lines: `SHATKODU` / `SHPIETT` (code), `SHATADI` / `SHAT_ADI` (name)
//! - Stops: `SDURAKKODU`, `SDURAKADI`, `SILCEADI`, `KOORDINAT` as WKT
//!   `POINT (lon lat)`, `SYON` (heading hint). Older records drop the `S` prefix.
//! - Schedules: `SGUNTIPI` (`I` weekday, `C` Saturday, `P` Sunday), `SYON`
//!   (`G` outbound, `D` inbound), `DT` (departure time), `SGUZERAH` (variant)
//!
//! # Proxy
//!
//! - `POST {workers}/line-vehicles` with `{"line": "34"}` returns either a
//!   vehicle array or `{"vehicles": [...]}`. Vehicle fields: `vehicleDoorCode`,
//!   `lat`, `lon` (numbers or strings), `direction` (destination label),
//!   `guzergah` (route-variant code such as `34_G_D0`).
//! - `GET {workers}/api/route-stations?hatkod=34&langid=1` returns the route
//!   detail HTML page. Each direction's stops are anchors carrying
//!   `dkod=<code>` and `stationname=<name>` followed by `<p>N. Name</p>`; the
//!   outbound block follows the first `KALKIŞ` header and ends at the
//!   `col-md-6` column break.
//! - `POST {workers}/line-information` with `{"line": "34"}` returns the line
//!   information card, passed through untouched.
//! - `GET {workers}/api/line-suggestions?q=34` returns line suggestions,
//!   passed through untouched.
//!
//! # IETT website
//!
//! Both calls need a `Referer` of `{web}/RouteDetail?hkod={line}`.
//!
//! - `GET {web}/tr/RouteStation/GetAllRoute?rcode=34` lists the route variants
//!   (`GUZERGAH_GUZERGAH_KODU`, `GUZERGAH_ADI`).
//! - `GET {web}/tr/RouteStation/GetRoutePinV2?q=34_G_D0` returns one variant
//!   (sometimes wrapped in an array) with `stationPlaces` (`stationCode`,
//!   `stationName`, `lat`, `lng`) and `line`, a WKT linestring of `lon lat`
//!   pairs.
//!
//! # OSRM
//!
//! `GET {osrm}/route/v1/driving/{lon,lat;...}?overview=full&geometries=geojson`
//! with at most `osrm_chunk_size` waypoints per request. Chunks overlap by one
//! waypoint so the stitched line is continuous.

use regex::Regex;
use roxmltree::Document;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{SourceError, SourceFuture, TransitSource};
use crate::config::UpstreamConfig;
use crate::models::{
    parse_route_variant, Coordinate, DayType, Direction, Line, LineSchedule, LineVariant,
    RouteDirection, RouteStop, RouteTopology, ScheduledDeparture, Stop, StopCatalog,
    VehiclePosition,
};

const ROUTE_SERVICE: &str = "UlasimAnaVeri/HatDurakGuzergah.asmx";
const SCHEDULE_SERVICE: &str = "UlasimAnaVeri/PlanlananSeferSaati.asmx";
const SOAP_NAMESPACE: &str = "http://tempuri.org/";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; transit-eta)";

// Retry configuration for the slow-changing catalogs
const MAX_ATTEMPTS: u32 = 2;
const RETRY_DELAY_SECS: u64 = 2;

static WKT_POINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"POINT\s*\(\s*(-?[0-9.]+)\s+(-?[0-9.]+)\s*\)").expect("valid WKT regex")
});

static LINESTRING_POINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?[0-9.]+)\s+(-?[0-9.]+)").expect("valid linestring regex")
});

static ROUTE_STATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)dkod=(\d+)[^"]*stationname=([^"&]+)[^>]*>.*?<p>(\d+)\.\s*([^<]+)"#)
        .expect("valid route station regex")
});

static OUTBOUND_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)KALKIŞ(.*?)class="col-md-6"#).expect("valid outbound block regex")
});

static INBOUND_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)KALKIŞ.*?class="col-md-6(.*)"#).expect("valid inbound block regex")
});

#[derive(Debug, Clone)]
pub struct IettClient {
    client: reqwest::Client,
    soap_base_url: String,
    workers_base_url: String,
    osrm_base_url: String,
    web_base_url: String,
    default_timeout: Duration,
    stop_catalog_timeout: Duration,
    schedule_timeout: Duration,
    osrm_chunk_size: usize,
}

impl IettClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(config.default_timeout_secs))
            .build()
            .map_err(|e| SourceError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            soap_base_url: config.soap_base_url.trim_end_matches('/').to_string(),
            workers_base_url: config.workers_base_url.trim_end_matches('/').to_string(),
            osrm_base_url: config.osrm_base_url.trim_end_matches('/').to_string(),
            web_base_url: config.iett_web_base_url.trim_end_matches('/').to_string(),
            default_timeout: Duration::from_secs(config.default_timeout_secs),
            stop_catalog_timeout: Duration::from_secs(config.stop_catalog_timeout_secs),
            schedule_timeout: Duration::from_secs(config.schedule_timeout_secs),
            // A chunk needs two waypoints to make progress
            osrm_chunk_size: config.osrm_chunk_size.max(2),
        })
    }

    /// Calls a SOAP method and returns the records of its JSON result
    async fn soap_call(
        &self,
        service: &str,
        method: &str,
        parameter: (&str, &str),
        timeout: Duration,
    ) -> Result<Vec<Value>, SourceError> {
        let url = format!("{}/{}", self.soap_base_url, service);
        let envelope = soap_envelope(method, parameter);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.soap_request(&url, method, &envelope, timeout).await {
                Ok(records) => return Ok(records),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    warn!(method, attempt, error = %e, "Transient SOAP error, will retry");
                    tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECS)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn soap_request(
        &self,
        url: &str,
        method: &str,
        envelope: &str,
        timeout: Duration,
    ) -> Result<Vec<Value>, SourceError> {
        debug!(url = %url, method, "Calling SOAP service");

        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{}{}\"", SOAP_NAMESPACE, method))
            .body(envelope.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        extract_soap_records(&body, method)
    }

    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, SourceError> {
        self.get_text_with_referer(url, None, timeout).await
    }

    async fn get_text_with_referer(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> Result<String, SourceError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(referer) = referer {
            request = request.header("Referer", referer);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    /// Road geometry through `points`, stitched from OSRM chunks.
    ///
    /// A chunk OSRM cannot route degrades to straight segments between its
    /// waypoints.
    async fn fetch_road_geometry(&self, points: &[Coordinate]) -> Vec<Coordinate> {
        if points.len() < 2 {
            return points.to_vec();
        }

        let step = self.osrm_chunk_size - 1;
        let mut geometry: Vec<Coordinate> = Vec::new();
        let mut start = 0;

        while start < points.len() - 1 {
            let end = (start + self.osrm_chunk_size).min(points.len());
            let chunk = &points[start..end];

            let routed = match self.route_chunk(chunk).await {
                Ok(routed) if !routed.is_empty() => routed,
                Ok(_) => chunk.to_vec(),
                Err(e) => {
                    debug!(error = %e, waypoints = chunk.len(), "OSRM chunk failed, using straight segments");
                    chunk.to_vec()
                }
            };

            let skip = usize::from(!geometry.is_empty());
            geometry.extend(routed.into_iter().skip(skip));
            start += step;
        }

        geometry
    }

    async fn route_chunk(&self, chunk: &[Coordinate]) -> Result<Vec<Coordinate>, SourceError> {
        let waypoints = chunk
            .iter()
            .map(|c| format!("{},{}", c.lon, c.lat))
            .collect::<Vec<_>>()
            .join(";");
        let url = format!(
            "{}/route/v1/driving/{}?overview=full&geometries=geojson",
            self.osrm_base_url, waypoints
        );

        let body = self.get_text(&url, self.default_timeout).await?;
        let data: Value = serde_json::from_str(&body)?;
        parse_osrm_geometry(&data)
    }

    async fn post_line_json(&self, path: &str, line: &str) -> Result<Value, SourceError> {
        let url = format!("{}/{}", self.workers_base_url, path);
        let response = self
            .client
            .post(&url)
            .timeout(self.default_timeout)
            .json(&serde_json::json!({ "line": line }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        Ok(response.json().await?)
    }

    async fn build_direction(
        &self,
        stations: Vec<ScrapedStation>,
        catalog: &StopCatalog,
    ) -> RouteDirection {
        let stops: Vec<RouteStop> = stations
            .into_iter()
            .map(|station| RouteStop {
                coordinate: catalog.coordinate(&station.code),
                sequence: station.sequence,
                code: station.code,
                name: station.name,
            })
            .collect();

        let waypoints: Vec<Coordinate> = stops.iter().filter_map(|stop| stop.coordinate).collect();
        let polyline = self.fetch_road_geometry(&waypoints).await;

        RouteDirection { stops, polyline }
    }
}

impl TransitSource for IettClient {
    fn fetch_lines(&self) -> SourceFuture<'_, Vec<Line>> {
        Box::pin(async move {
            let records = self
                .soap_call(ROUTE_SERVICE, "GetHat_json", ("HatKodu", ""), self.default_timeout)
                .await?;
            let lines: Vec<Line> = records.iter().filter_map(parse_line).collect();
            info!(count = lines.len(), "Fetched line catalog");
            Ok(lines)
        })
    }

    fn fetch_stops(&self) -> SourceFuture<'_, Vec<Stop>> {
        Box::pin(async move {
            let records = self
                .soap_call(
                    ROUTE_SERVICE,
                    "GetDurak_json",
                    ("DurakKodu", ""),
                    self.stop_catalog_timeout,
                )
                .await?;
            let stops: Vec<Stop> = records.iter().filter_map(parse_stop).collect();
            info!(count = stops.len(), "Fetched stop catalog");
            Ok(stops)
        })
    }

    fn fetch_route_topology<'a>(
        &'a self,
        line: &'a str,
        stops: &'a StopCatalog,
    ) -> SourceFuture<'a, RouteTopology> {
        Box::pin(async move {
            let url = format!(
                "{}/api/route-stations?hatkod={}&langid=1",
                self.workers_base_url,
                urlencoding::encode(line)
            );
            let html = self.get_text(&url, self.default_timeout).await?;
            let (outbound, inbound) = parse_route_stations(&html);

            let (outbound, inbound) = tokio::join!(
                self.build_direction(outbound, stops),
                self.build_direction(inbound, stops)
            );

            info!(
                line = %line,
                outbound_stops = outbound.stops.len(),
                inbound_stops = inbound.stops.len(),
                outbound_points = outbound.polyline.len(),
                inbound_points = inbound.polyline.len(),
                "Fetched route topology"
            );

            Ok(RouteTopology {
                line: line.to_string(),
                outbound,
                inbound,
            })
        })
    }

    fn fetch_vehicle_positions<'a>(&'a self, line: &'a str) -> SourceFuture<'a, Vec<VehiclePosition>> {
        Box::pin(async move {
            let body = self.post_line_json("line-vehicles", line).await?;
            let vehicles = parse_vehicles(&body)?;
            debug!(line = %line, count = vehicles.len(), "Fetched vehicle positions");
            Ok(vehicles)
        })
    }

    fn fetch_schedule<'a>(&'a self, line: &'a str) -> SourceFuture<'a, LineSchedule> {
        Box::pin(async move {
            let records = self
                .soap_call(
                    SCHEDULE_SERVICE,
                    "GetPlanlananSeferSaati_json",
                    ("HatKodu", line),
                    self.schedule_timeout,
                )
                .await?;
            Ok(parse_schedule(line, &records))
        })
    }

    fn fetch_line_variants<'a>(&'a self, line: &'a str) -> SourceFuture<'a, Vec<LineVariant>> {
        Box::pin(async move {
            let referer = format!(
                "{}/RouteDetail?hkod={}",
                self.web_base_url,
                urlencoding::encode(line)
            );
            let url = format!(
                "{}/tr/RouteStation/GetAllRoute?rcode={}",
                self.web_base_url,
                urlencoding::encode(line)
            );
            let listing: Value = serde_json::from_str(
                &self
                    .get_text_with_referer(&url, Some(referer.as_str()), self.default_timeout)
                    .await?,
            )?;

            let mut variants = Vec::new();
            for (code, label) in parse_variant_listing(&listing)? {
                let url = format!(
                    "{}/tr/RouteStation/GetRoutePinV2?q={}",
                    self.web_base_url,
                    urlencoding::encode(&code)
                );
                let detail: Value = serde_json::from_str(
                    &self
                        .get_text_with_referer(&url, Some(referer.as_str()), self.default_timeout)
                        .await?,
                )?;
                variants.push(parse_variant_pins(code, label, &detail)?);
            }

            info!(line = %line, variants = variants.len(), "Fetched line variants");
            Ok(variants)
        })
    }

    fn fetch_line_info<'a>(&'a self, line: &'a str) -> SourceFuture<'a, Value> {
        Box::pin(async move { self.post_line_json("line-information", line).await })
    }

    fn fetch_line_suggestions<'a>(&'a self, query: &'a str) -> SourceFuture<'a, Value> {
        Box::pin(async move {
            let url = format!(
                "{}/api/line-suggestions?q={}",
                self.workers_base_url,
                urlencoding::encode(query)
            );
            let body = self.get_text(&url, self.default_timeout).await?;
            Ok(serde_json::from_str(&body)?)
        })
    }
}

fn soap_envelope(method: &str, (name, value): (&str, &str)) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
  xmlns:xsd="http://www.w3.org/2001/XMLSchema"
  xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <{method} xmlns="{SOAP_NAMESPACE}"><{name}>{value}</{name}></{method}>
  </soap:Body>
</soap:Envelope>"#,
        value = escape_xml(value)
    )
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Extracts the JSON records carried in the `{method}Result` element.
///
/// A response without that element did not come from the service and is an
/// error. An empty element is a successful answer with no records.
fn extract_soap_records(xml: &str, method: &str) -> Result<Vec<Value>, SourceError> {
    let doc = Document::parse(xml)?;
    let result_tag = format!("{}Result", method);
    let result = doc
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == result_tag)
        .ok_or_else(|| SourceError::ParseError(format!("Response has no {} element", result_tag)))?;

    let payload = result.text().unwrap_or_default();
    if payload.trim().is_empty() {
        return Ok(Vec::new());
    }

    Ok(serde_json::from_str(payload)?)
}

/// First non-empty string (or number) value among `keys`
fn first_str(record: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| match record.get(*key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .next()
        .unwrap_or_default()
}

fn value_as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_line(record: &Value) -> Option<Line> {
    let code = first_str(record, &["SHATKODU", "SHPIETT"]);
    if code.is_empty() {
        return None;
    }
    Some(Line {
        code,
        name: first_str(record, &["SHATADI", "SHAT_ADI"]),
    })
}

fn parse_wkt_point(wkt: &str) -> Option<Coordinate> {
    let captures = WKT_POINT.captures(wkt)?;
    let lon: f64 = captures[1].parse().ok()?;
    let lat: f64 = captures[2].parse().ok()?;
    Some(Coordinate::new(lat, lon))
}

fn parse_stop(record: &Value) -> Option<Stop> {
    let code = first_str(record, &["SDURAKKODU", "DURAKKODU"]);
    if code.is_empty() {
        return None;
    }
    let coordinate = parse_wkt_point(&first_str(record, &["KOORDINAT"])).unwrap_or_default();

    Some(Stop {
        code,
        name: first_str(record, &["SDURAKADI", "DURAKADI"]),
        district: first_str(record, &["SILCEADI", "ILCEADI"]),
        coordinate,
        direction_hint: first_str(record, &["SYON"]),
    })
}

fn parse_vehicle(record: &Value) -> VehiclePosition {
    let route_code = first_str(record, &["guzergah"]);
    let (direction_code, variant) = parse_route_variant(&route_code);
    let coordinate = Coordinate::new(
        value_as_f64(record.get("lat")).unwrap_or(0.0),
        value_as_f64(record.get("lon")).unwrap_or(0.0),
    );

    VehiclePosition {
        vehicle_id: first_str(record, &["vehicleDoorCode"]),
        coordinate,
        direction: Direction::from_code(&direction_code),
        direction_code,
        variant,
        route_code,
        heading_label: first_str(record, &["direction"]),
    }
}

fn parse_vehicles(body: &Value) -> Result<Vec<VehiclePosition>, SourceError> {
    let records = match body {
        Value::Array(records) => records,
        Value::Object(map) => match map.get("vehicles") {
            Some(Value::Array(records)) => records,
            _ => {
                return Err(SourceError::ParseError(
                    "vehicle response has no vehicles array".to_string(),
                ))
            }
        },
        _ => {
            return Err(SourceError::ParseError(
                "unexpected vehicle response shape".to_string(),
            ))
        }
    };

    Ok(records
        .iter()
        .filter(|record| record.is_object())
        .map(parse_vehicle)
        .collect())
}

fn parse_schedule(line: &str, records: &[Value]) -> LineSchedule {
    let mut departures: BTreeMap<DayType, BTreeMap<Direction, Vec<ScheduledDeparture>>> =
        BTreeMap::new();

    for record in records {
        let Some(day) = DayType::from_code(&first_str(record, &["SGUNTIPI"])) else {
            continue;
        };
        let Some(direction) = Direction::from_code(&first_str(record, &["SYON"])) else {
            continue;
        };
        departures
            .entry(day)
            .or_default()
            .entry(direction)
            .or_default()
            .push(ScheduledDeparture {
                variant: first_str(record, &["SGUZERAH"]),
                time: first_str(record, &["DT"]),
            });
    }

    for by_direction in departures.values_mut() {
        for list in by_direction.values_mut() {
            list.sort_by(|a, b| a.time.cmp(&b.time));
        }
    }

    LineSchedule {
        line: line.to_string(),
        departures,
    }
}

fn parse_osrm_geometry(data: &Value) -> Result<Vec<Coordinate>, SourceError> {
    let code = data.get("code").and_then(Value::as_str).unwrap_or_default();
    if code != "Ok" {
        return Err(SourceError::ParseError(format!("OSRM answered {:?}", code)));
    }

    let coordinates = data
        .pointer("/routes/0/geometry/coordinates")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::ParseError("OSRM route has no geometry".to_string()))?;

    Ok(coordinates
        .iter()
        .filter_map(|pair| {
            let pair = pair.as_array()?;
            let lon = pair.first()?.as_f64()?;
            let lat = pair.get(1)?.as_f64()?;
            Some(Coordinate::new(lat, lon))
        })
        .collect())
}

/// `(code, label)` of every variant in a `GetAllRoute` listing
fn parse_variant_listing(body: &Value) -> Result<Vec<(String, String)>, SourceError> {
    let records = body
        .as_array()
        .ok_or_else(|| SourceError::ParseError("variant listing is not an array".to_string()))?;

    Ok(records
        .iter()
        .filter_map(|record| {
            let code = first_str(record, &["GUZERGAH_GUZERGAH_KODU"]);
            if code.is_empty() {
                return None;
            }
            let label = first_str(record, &["GUZERGAH_ADI"]);
            let label = if label.is_empty() { code.clone() } else { label };
            Some((code, label))
        })
        .collect())
}

fn parse_variant_pins(code: String, label: String, body: &Value) -> Result<LineVariant, SourceError> {
    let detail = match body {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| SourceError::ParseError(format!("variant {} has no pins", code)))?,
        other => other,
    };

    let stops = detail
        .get("stationPlaces")
        .and_then(Value::as_array)
        .map(|places| {
            places
                .iter()
                .enumerate()
                .map(|(i, place)| {
                    let coordinate = Coordinate::new(
                        value_as_f64(place.get("lat")).unwrap_or(0.0),
                        value_as_f64(place.get("lng")).unwrap_or(0.0),
                    );
                    RouteStop {
                        sequence: i as u32 + 1,
                        code: first_str(place, &["stationCode"]),
                        name: first_str(place, &["stationName"]),
                        coordinate: Some(coordinate).filter(Coordinate::is_known),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let polyline = detail
        .get("line")
        .and_then(Value::as_str)
        .map(parse_linestring)
        .unwrap_or_default();

    Ok(LineVariant {
        code,
        label,
        stops,
        polyline,
    })
}

/// Coordinates of a WKT linestring (`lon lat` pairs)
fn parse_linestring(wkt: &str) -> Vec<Coordinate> {
    LINESTRING_POINT
        .captures_iter(wkt)
        .filter_map(|captures| {
            let lon: f64 = captures[1].parse().ok()?;
            let lat: f64 = captures[2].parse().ok()?;
            Some(Coordinate::new(lat, lon))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
struct ScrapedStation {
    sequence: u32,
    code: String,
    name: String,
}

/// Outbound and inbound stop lists scraped from the route detail page
fn parse_route_stations(html: &str) -> (Vec<ScrapedStation>, Vec<ScrapedStation>) {
    let mut middle = html.len() / 2;
    while !html.is_char_boundary(middle) {
        middle -= 1;
    }

    let outbound_block = OUTBOUND_BLOCK
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(&html[..middle]);
    let inbound_block = INBOUND_BLOCK
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(&html[middle..]);

    (scrape_stations(outbound_block), scrape_stations(inbound_block))
}

fn scrape_stations(block: &str) -> Vec<ScrapedStation> {
    ROUTE_STATION
        .captures_iter(block)
        .filter_map(|captures| {
            let code = captures[1].to_string();
            let station_name = decode_form_component(&captures[2]);
            let sequence = captures[3].parse().ok()?;
            let name = if station_name.trim().is_empty() {
                captures[4].trim().to_string()
            } else {
                station_name.trim().to_string()
            };
            Some(ScrapedStation {
                sequence,
                code,
                name,
            })
        })
        .collect()
}

/// `application/x-www-form-urlencoded` decoding (`+` is a space)
fn decode_form_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}
