//! Background housekeeping.
//!
//! Two workers run next to the server: one sweeps expired attempt-guard state
//! and the memoized OTP entry, the other appends the counter to the
//! persistence log. Both are idempotent, so a skipped tick loses nothing.

use crate::{guard::PurgeReport, service::BrickService};
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info};

const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(600);
const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug)]
pub struct MaintenanceConfig {
    purge_interval: Duration,
    snapshot_interval: Duration,
}

impl MaintenanceConfig {
    /// Default: purge every minute, snapshot every ten minutes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            purge_interval: DEFAULT_PURGE_INTERVAL,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }

    #[must_use]
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval;
        self
    }

    #[must_use]
    pub fn purge_interval(&self) -> Duration {
        self.purge_interval
    }

    #[must_use]
    pub fn snapshot_interval(&self) -> Duration {
        self.snapshot_interval
    }

    /// Zero intervals would spin; clamp them.
    #[must_use]
    pub fn normalize(self) -> Self {
        Self {
            purge_interval: clamp(self.purge_interval),
            snapshot_interval: clamp(self.snapshot_interval),
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp(interval: Duration) -> Duration {
    if interval.is_zero() {
        MIN_INTERVAL
    } else {
        interval
    }
}

/// Handles of the running workers. Dropping this aborts them.
#[derive(Debug)]
pub struct Maintenance {
    handles: Vec<JoinHandle<()>>,
}

impl Maintenance {
    #[must_use]
    pub fn spawn(service: Arc<BrickService>, config: MaintenanceConfig) -> Self {
        let config = config.normalize();
        Self {
            handles: vec![
                spawn_purge_worker(service.clone(), config.purge_interval()),
                spawn_snapshot_worker(service, config.snapshot_interval()),
            ],
        }
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Drop expired guard records and the stale OTP cache entry.
pub fn purge_once(service: &BrickService) -> PurgeReport {
    let report = service.guard().purge_expired();
    let otp_purged = service.otp().purge_expired(service.clock().now());

    if report == PurgeReport::default() && !otp_purged {
        debug!("maintenance purge: nothing to do");
    } else {
        info!(
            pruned_attempts = report.pruned_attempts,
            removed_failure_records = report.removed_failure_records,
            removed_blocks = report.removed_blocks,
            otp_purged,
            "maintenance purge"
        );
    }

    report
}

pub fn spawn_purge_worker(service: Arc<BrickService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(clamp(every));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            purge_once(&service);
        }
    })
}

pub fn spawn_snapshot_worker(service: Arc<BrickService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(clamp(every));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match service.counter().snapshot().await {
                Ok(count) => debug!(count, "counter snapshot logged"),
                Err(err) => error!("counter snapshot failed: {err}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::test_support, clock::Clock, counter::MemoryCounterBackend};
    use chrono::Duration as Delta;

    #[tokio::test]
    async fn purge_once_clears_elapsed_state() {
        let (service, clock) = test_support::service(0);
        for _ in 0..3 {
            let _ = service.guard().record_failure("A");
        }
        let _ = service.guard().record_failure("B");
        let _ = service.otp().current_code(clock.now());

        clock.advance(Delta::minutes(5));
        let report = purge_once(&service);

        assert_eq!(report.removed_blocks, 1);
        assert_eq!(report.removed_failure_records, 2);
        assert_eq!(report.pruned_attempts, 4);
        assert!(service.guard().blocked_clients().is_empty());
        assert!(service.guard().pending_failures().is_empty());

        assert_eq!(purge_once(&service), PurgeReport::default());
    }

    #[tokio::test]
    async fn snapshot_worker_appends_to_log() {
        let backend = Arc::new(MemoryCounterBackend::new(21));
        let (service, _clock) = test_support::service_with(backend.clone());

        let maintenance = Maintenance::spawn(
            service,
            MaintenanceConfig::new()
                .with_purge_interval(Duration::from_millis(10))
                .with_snapshot_interval(Duration::from_secs(3_600)),
        );

        // The first tick fires immediately.
        let mut waited = Duration::ZERO;
        while backend.log_entries().is_empty() && waited < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += Duration::from_millis(10);
        }
        maintenance.shutdown();

        let entries = backend.log_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].count, 21);
    }

    #[test]
    fn normalize_clamps_zero_intervals() {
        let config = MaintenanceConfig::new()
            .with_purge_interval(Duration::ZERO)
            .with_snapshot_interval(Duration::ZERO)
            .normalize();
        assert_eq!(config.purge_interval(), MIN_INTERVAL);
        assert_eq!(config.snapshot_interval(), MIN_INTERVAL);
    }
}
