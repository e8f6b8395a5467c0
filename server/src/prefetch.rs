use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::PrefetchConfig;
use crate::store::TransitStore;

const PROGRESS_EVERY: usize = 100;

/// Outcome of one walk over the line catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    pub walked: usize,
    pub refreshed: usize,
    pub warm: usize,
    pub failed: usize,
}

/// Keeps the route topology cache warm so arrival estimates find every line
pub struct Prefetcher {
    store: Arc<TransitStore>,
    workers: usize,
    submit_delay: Duration,
    rerun_every: Duration,
}

impl Prefetcher {
    pub fn new(store: Arc<TransitStore>, config: &PrefetchConfig, rerun_every: Duration) -> Self {
        Self {
            store,
            workers: config.workers.max(1),
            submit_delay: config.submit_delay(),
            rerun_every: rerun_every.max(Duration::from_secs(60)),
        }
    }

    /// Walks the catalog now, then again every line catalog TTL
    pub async fn start(self: Arc<Self>) {
        info!(workers = self.workers, "Starting topology prefetcher");

        self.run_once().await;

        let mut interval = tokio::time::interval(self.rerun_every);
        // The first tick fires immediately and we just walked
        interval.tick().await;

        loop {
            interval.tick().await;
            self.run_once().await;
        }
    }

    /// Submits a topology refresh for every cold line, in catalog order.
    ///
    /// At most `workers` refreshes run at once. A failed line is counted and
    /// the walk carries on.
    pub async fn run_once(&self) -> PrefetchReport {
        let lines = self.store.lines().await.value;
        info!(lines = lines.len(), workers = self.workers, "Prefetching route topologies");

        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = FuturesUnordered::new();
        let mut report = PrefetchReport::default();
        let mut submitted = 0usize;

        for line in lines.iter() {
            report.walked += 1;
            if report.walked % PROGRESS_EVERY == 0 {
                info!(
                    walked = report.walked,
                    total = lines.len(),
                    submitted,
                    "Prefetch progress"
                );
            }

            if !self.store.topology_expired(&line.code).await {
                report.warm += 1;
                continue;
            }

            if submitted > 0 && !self.submit_delay.is_zero() {
                tokio::time::sleep(self.submit_delay).await;
            }

            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let store = Arc::clone(&self.store);
            let code = line.code.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                let status = store.route_topology(&code).await.status;
                (code, status)
            }));
            submitted += 1;
        }

        while let Some(joined) = tasks.next().await {
            match joined {
                Ok((_, status)) if !status.is_failure() => report.refreshed += 1,
                Ok((code, status)) => {
                    report.failed += 1;
                    debug!(line = %code, status = ?status, "Topology prefetch failed");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, "Topology prefetch task aborted");
                }
            }
        }

        info!(
            walked = report.walked,
            refreshed = report.refreshed,
            warm = report.warm,
            failed = report.failed,
            "Completed topology prefetch"
        );

        report
    }
}
