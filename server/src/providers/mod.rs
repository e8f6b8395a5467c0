pub mod iett;
#[cfg(test)]
pub mod mock;

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

use crate::models::{
    Line, LineSchedule, LineVariant, RouteTopology, Stop, StopCatalog, VehiclePosition,
};

pub use iett::IettClient;

/// Boxed future returned by [`TransitSource`] so the trait stays dyn-compatible
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Upstream data the arrival engine depends on.
///
/// Every fetch may fail; an `Ok` with an empty payload means the upstream
/// answered and had nothing to report.
pub trait TransitSource: Send + Sync {
    fn fetch_lines(&self) -> SourceFuture<'_, Vec<Line>>;

    fn fetch_stops(&self) -> SourceFuture<'_, Vec<Stop>>;

    /// Stop sequences and road geometry for both directions of a line.
    ///
    /// `stops` is the current stop catalog, the coordinate authority for the
    /// stops in the sequence.
    fn fetch_route_topology<'a>(
        &'a self,
        line: &'a str,
        stops: &'a StopCatalog,
    ) -> SourceFuture<'a, RouteTopology>;

    fn fetch_vehicle_positions<'a>(&'a self, line: &'a str) -> SourceFuture<'a, Vec<VehiclePosition>>;

    fn fetch_schedule<'a>(&'a self, line: &'a str) -> SourceFuture<'a, LineSchedule>;

    /// Every route variant of a line, each with its own stops and geometry
    fn fetch_line_variants<'a>(&'a self, line: &'a str) -> SourceFuture<'a, Vec<LineVariant>>;

    /// Free-form line information (operator, fares, notices) as published upstream
    fn fetch_line_info<'a>(&'a self, line: &'a str) -> SourceFuture<'a, Value>;

    /// Line suggestions for a partial code or name, passed through as published
    fn fetch_line_suggestions<'a>(&'a self, query: &'a str) -> SourceFuture<'a, Value>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Upstream returned HTTP {status}: {url}")]
    HttpStatus { status: u16, url: String },
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl SourceError {
    /// Returns true if the error is transient and the request may succeed later
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::NetworkError(_) | SourceError::Timeout(_) => true,
            SourceError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            SourceError::ParseError(_) => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        if e.is_timeout() {
            SourceError::Timeout(url)
        } else if let Some(status) = e.status() {
            SourceError::HttpStatus {
                status: status.as_u16(),
                url,
            }
        } else if e.is_decode() {
            SourceError::ParseError(e.to_string())
        } else {
            SourceError::NetworkError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::ParseError(e.to_string())
    }
}

impl From<roxmltree::Error> for SourceError {
    fn from(e: roxmltree::Error) -> Self {
        SourceError::ParseError(format!("Invalid XML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SourceError::NetworkError("reset".into()).is_retryable());
        assert!(SourceError::Timeout("http://x".into()).is_retryable());
        assert!(SourceError::HttpStatus {
            status: 503,
            url: "http://x".into()
        }
        .is_retryable());
        assert!(SourceError::HttpStatus {
            status: 429,
            url: "http://x".into()
        }
        .is_retryable());
        assert!(!SourceError::HttpStatus {
            status: 404,
            url: "http://x".into()
        }
        .is_retryable());
        assert!(!SourceError::ParseError("bad".into()).is_retryable());
    }
}
