//! Per-vehicle progress memory used to damp GPS jitter.
//!
//! Each poll computes a vehicle's nearest stop afresh, which occasionally
//! jumps a few stops backwards near junctions or under noisy GPS. The tracker
//! holds the last accepted stop-sequence index for a while and refuses small
//! regressions inside that window. This is a heuristic smoothing filter, not a
//! Kalman or particle filter: it trades precision for simplicity and bounded
//! memory.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::config::{ConfigError, TrackerConfig};

/// Last accepted stop index for a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressRecord {
    pub stop_index: i64,
    pub observed_at: DateTime<Utc>,
}

pub struct ProgressTracker {
    records: DashMap<String, ProgressRecord>,
    max_regression: i64,
    trust_window: Duration,
    retention: Duration,
    sweep_threshold: usize,
}

impl ProgressTracker {
    pub fn new(config: &TrackerConfig) -> Result<Self, ConfigError> {
        let (trust_window, retention) = config.windows()?;
        Ok(Self {
            records: DashMap::new(),
            max_regression: config.max_regression,
            trust_window,
            retention,
            sweep_threshold: config.sweep_threshold,
        })
    }

    /// Records an observation and returns the smoothed stop index.
    ///
    /// The read-modify-write runs under the map's shard lock for this vehicle,
    /// so concurrent observations of the same vehicle cannot lose updates.
    pub fn observe(&self, vehicle_id: &str, raw_index: i64, now: DateTime<Utc>) -> i64 {
        let accepted = {
            let mut record = self
                .records
                .entry(vehicle_id.to_string())
                .or_insert(ProgressRecord {
                    stop_index: raw_index,
                    observed_at: now,
                });

            let last = *record;
            let regression = last.stop_index - raw_index;
            let hold = raw_index < last.stop_index
                && regression < self.max_regression
                && now - last.observed_at < self.trust_window;

            let accepted = if hold { last.stop_index } else { raw_index };
            if hold {
                tracing::trace!(
                    vehicle = %vehicle_id,
                    raw_index,
                    held_index = accepted,
                    "Holding vehicle position against small regression"
                );
            }

            *record = ProgressRecord {
                stop_index: accepted,
                observed_at: now,
            };
            accepted
        };

        if self.records.len() > self.sweep_threshold {
            self.sweep(now);
        }

        accepted
    }

    /// Drops every record older than the retention window
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| now - record.observed_at <= self.retention);
        let removed = before.saturating_sub(self.records.len());
        tracing::debug!(removed, remaining = self.records.len(), "Swept stale progress records");
        removed
    }

    #[cfg(test)]
    pub fn get(&self, vehicle_id: &str) -> Option<ProgressRecord> {
        self.records.get(vehicle_id).map(|record| *record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
