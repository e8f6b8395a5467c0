use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub tracker: TrackerConfig,
    pub estimator: EstimatorConfig,
    pub prefetch: PrefetchConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            cors_origins: Vec::new(),
            cors_permissive: false,
        }
    }
}

/// Upstream endpoints and request timeouts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// IBB SOAP services (line, stop and schedule catalogs)
    pub soap_base_url: String,
    /// Proxy serving live vehicles and route station pages
    pub workers_base_url: String,
    /// OSRM instance used for road geometry
    pub osrm_base_url: String,
    /// IETT website serving route variants and their stop pins
    pub iett_web_base_url: String,
    pub default_timeout_secs: u64,
    pub stop_catalog_timeout_secs: u64,
    pub schedule_timeout_secs: u64,
    /// Maximum waypoints per OSRM request
    pub osrm_chunk_size: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            soap_base_url: "https://api.ibb.gov.tr/iett".to_string(),
            workers_base_url: "https://iett.rednexie.workers.dev".to_string(),
            osrm_base_url: "https://router.project-osrm.org".to_string(),
            iett_web_base_url: "https://www.iett.istanbul".to_string(),
            default_timeout_secs: 10,
            stop_catalog_timeout_secs: 30,
            schedule_timeout_secs: 15,
            osrm_chunk_size: 80,
        }
    }
}

/// Time-to-live per cached dataset, in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub line_catalog_ttl_secs: u64,
    pub stop_catalog_ttl_secs: u64,
    pub topology_ttl_secs: u64,
    pub schedule_ttl_secs: u64,
    pub vehicle_ttl_secs: u64,
    pub variant_ttl_secs: u64,
    pub line_info_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            line_catalog_ttl_secs: 24 * 60 * 60,
            stop_catalog_ttl_secs: 24 * 60 * 60,
            topology_ttl_secs: 24 * 60 * 60,
            schedule_ttl_secs: 12 * 60 * 60,
            vehicle_ttl_secs: 45,
            variant_ttl_secs: 24 * 60 * 60,
            line_info_ttl_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Backward jumps smaller than this many stops are held
    pub max_regression: i64,
    /// Records younger than this are trusted for holding
    pub trust_window_secs: i64,
    /// Records older than this are dropped by the sweep
    pub retention_secs: i64,
    /// Sweep runs once the tracker holds more records than this
    pub sweep_threshold: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_regression: 20,
            trust_window_secs: 3600,
            retention_secs: 7200,
            sweep_threshold: 10_000,
        }
    }
}

impl TrackerConfig {
    /// Trust and retention windows as chrono durations
    pub fn windows(&self) -> Result<(chrono::Duration, chrono::Duration), ConfigError> {
        let window = |name: &str, secs: i64| {
            chrono::Duration::try_seconds(secs).ok_or_else(|| {
                ConfigError::InvalidValue(format!("tracker.{} out of range: {}", name, secs))
            })
        };
        Ok((
            window("trust_window_secs", self.trust_window_secs)?,
            window("retention_secs", self.retention_secs)?,
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Average system speed; 250 m/min is 15 km/h
    pub speed_m_per_min: f64,
    /// Distances above this never round down to "arriving"
    pub adjacent_threshold_m: f64,
    pub max_results: usize,
    /// Per-request budget for an arrival estimate
    pub deadline_ms: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            speed_m_per_min: 250.0,
            adjacent_threshold_m: 50.0,
            max_results: 20,
            deadline_ms: 10_000,
        }
    }
}

impl EstimatorConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    pub enabled: bool,
    pub workers: usize,
    pub submit_delay_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: 3,
            submit_delay_ms: 500,
        }
    }
}

impl PrefetchConfig {
    pub fn submit_delay(&self) -> Duration {
        Duration::from_millis(self.submit_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { max_results: 15 }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.tracker.windows()?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:3000");
        assert_eq!(config.cache.vehicle_ttl_secs, 45);
        assert_eq!(config.cache.schedule_ttl_secs, 43_200);
        assert_eq!(config.tracker.max_regression, 20);
        assert_eq!(config.prefetch.workers, 3);
        assert_eq!(config.search.max_results, 15);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let yaml = r#"
cache:
  vehicle_ttl_secs: 30
prefetch:
  workers: 5
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.cache.vehicle_ttl_secs, 30);
        assert_eq!(config.cache.line_catalog_ttl_secs, 86_400);
        assert_eq!(config.prefetch.workers, 5);
        assert_eq!(config.prefetch.submit_delay_ms, 500);
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let result = Config::parse("cache: [not, a, map]");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_out_of_range_tracker_window_is_rejected() {
        let yaml = "tracker:\n  trust_window_secs: 9223372036854775807\n";
        let result = Config::parse(yaml);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))), "{result:?}");
    }

    #[test]
    fn test_estimator_deadline_accepts_milliseconds() {
        let config = Config::parse("estimator:\n  deadline_ms: 250\n").unwrap();
        assert_eq!(config.estimator.deadline(), Duration::from_millis(250));
        assert_eq!(Config::default().estimator.deadline(), Duration::from_secs(10));
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::parse(include_str!("../config.example.yaml")).unwrap();
        assert_eq!(config.server.cors_origins, vec!["http://localhost:5173".to_string()]);
        assert_eq!(config.upstream.osrm_chunk_size, 80);
        assert_eq!(config.estimator.speed_m_per_min, 250.0);
        assert_eq!(config.estimator.deadline_ms, 10_000);
        assert_eq!(config.cache.variant_ttl_secs, 86_400);
    }
}
