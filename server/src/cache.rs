//! Time-bounded in-memory cache with stale-while-error refresh
//!
//! Entries are replaced wholesale on refresh and never mutated in place.
//! When a refresh fails the last payload is served (even if expired); when
//! there is no previous payload the caller-supplied empty default is served
//! and nothing is stored, so the next lookup retries the upstream.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use tokio::sync::{Mutex, RwLock};

use crate::providers::SourceError;

/// A cached payload and the time it was fetched
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub payload: V,
    pub fetched_at: DateTime<Utc>,
}

/// How a lookup was satisfied
#[derive(Debug, Clone, PartialEq)]
pub enum LookupStatus {
    /// Served from a non-expired entry
    Fresh,
    /// Fetched from the upstream and stored
    Refreshed,
    /// Refresh failed, the previous payload was served
    StaleDataServed { error: String },
    /// Refresh failed with nothing cached, the empty default was served
    UpstreamUnavailable { error: String },
}

impl LookupStatus {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            LookupStatus::StaleDataServed { .. } | LookupStatus::UpstreamUnavailable { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct Lookup<V> {
    pub value: V,
    pub status: LookupStatus,
}

/// Keyed store of `(payload, timestamp)` pairs sharing one TTL
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    /// Serializes refreshes when set; readers never wait on it
    refresh_gate: Option<Mutex<()>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: std::time::Duration) -> Self {
        Self {
            name,
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            entries: RwLock::new(HashMap::new()),
            refresh_gate: None,
        }
    }

    /// A cache that runs at most one refresh at a time. Callers arriving
    /// while a refresh is in flight wait for it and share its result.
    pub fn single_flight(name: &'static str, ttl: std::time::Duration) -> Self {
        Self {
            refresh_gate: Some(Mutex::new(())),
            ..Self::new(name, ttl)
        }
    }

    /// Payload regardless of age
    pub async fn get(&self, key: &K) -> Option<V> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|entry| entry.payload.clone())
    }

    pub async fn entry(&self, key: &K) -> Option<CacheEntry<V>> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn put(&self, key: K, payload: V, fetched_at: DateTime<Utc>) {
        self.entries.write().await.insert(
            key,
            CacheEntry {
                payload,
                fetched_at,
            },
        );
    }

    /// True when the entry is missing or `now - fetched_at >= ttl`
    pub async fn is_expired(&self, key: &K, now: DateTime<Utc>) -> bool {
        match self.entries.read().await.get(key) {
            Some(entry) => now - entry.fetched_at >= self.ttl,
            None => true,
        }
    }

    /// Every cached `(key, payload)` pair, expired or not
    pub async fn snapshot(&self) -> Vec<(K, V)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(key, entry)| (key.clone(), entry.payload.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns the cached payload, refreshing through `fetch` when the entry
    /// is missing or expired.
    ///
    /// The entry lock is never held while `fetch` runs.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        key: &K,
        now: DateTime<Utc>,
        empty: impl FnOnce() -> V,
        fetch: F,
    ) -> Lookup<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, SourceError>>,
    {
        let cached = self.entry(key).await;
        if let Some(fresh) = self.fresh(cached.as_ref(), now) {
            return fresh;
        }

        let gate = match &self.refresh_gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };
        // Whoever held the gate may have refreshed the entry meanwhile
        let cached = if gate.is_some() {
            let cached = self.entry(key).await;
            if let Some(fresh) = self.fresh(cached.as_ref(), now) {
                return fresh;
            }
            cached
        } else {
            cached
        };

        match fetch().await {
            Ok(payload) => {
                self.put(key.clone(), payload.clone(), now).await;
                tracing::debug!(cache = self.name, key = ?key, "Refreshed cache entry");
                Lookup {
                    value: payload,
                    status: LookupStatus::Refreshed,
                }
            }
            Err(e) => match cached {
                Some(entry) => {
                    tracing::warn!(
                        cache = self.name,
                        key = ?key,
                        error = %e,
                        age_secs = (now - entry.fetched_at).num_seconds(),
                        "Refresh failed, serving stale data"
                    );
                    Lookup {
                        value: entry.payload,
                        status: LookupStatus::StaleDataServed {
                            error: e.to_string(),
                        },
                    }
                }
                None => {
                    tracing::error!(
                        cache = self.name,
                        key = ?key,
                        error = %e,
                        "Refresh failed with nothing cached, serving empty default"
                    );
                    Lookup {
                        value: empty(),
                        status: LookupStatus::UpstreamUnavailable {
                            error: e.to_string(),
                        },
                    }
                }
            },
        }
    }
}

impl<K, V: Clone> TtlCache<K, V> {
    fn fresh(&self, cached: Option<&CacheEntry<V>>, now: DateTime<Utc>) -> Option<Lookup<V>> {
        cached
            .filter(|entry| now - entry.fetched_at < self.ttl)
            .map(|entry| Lookup {
                value: entry.payload.clone(),
                status: LookupStatus::Fresh,
            })
    }
}
