//! Periodic eviction of silent devices.
//!
//! The in-process sweep is the only thing that closes an idle connection.
//! Presence markers are refreshed and reconciled here too, but their own
//! expiry never closes anything.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::correlator::RequestCorrelator;
use crate::registry::ConnectionRegistry;
use crate::stores::PresenceTracker;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Devices evicted for inactivity.
    pub evicted: Vec<String>,
    /// Presence markers extended for live devices.
    pub refreshed: usize,
    /// Presence markers deleted because no session backs them.
    pub stale_markers: usize,
    /// Pending requests dropped for age.
    pub expired_requests: usize,
}

/// Timing for [`LivenessMonitor`].
#[derive(Debug, Clone, Copy)]
pub struct LivenessConfig {
    /// Time between sweeps.
    pub scan_interval: Duration,
    /// Silence after which a session is evicted.
    pub timeout: Duration,
    /// Age after which a pending request is dropped; `None` keeps them.
    pub pending_ttl: Option<Duration>,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            pending_ttl: Some(Duration::from_secs(300)),
        }
    }
}

/// Background sweeper over the registry.
pub struct LivenessMonitor {
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<RequestCorrelator>,
    presence: PresenceTracker,
    config: LivenessConfig,
}

impl LivenessMonitor {
    /// Create a monitor.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        correlator: Arc<RequestCorrelator>,
        presence: PresenceTracker,
        config: LivenessConfig,
    ) -> Self {
        Self {
            registry,
            correlator,
            presence,
            config,
        }
    }

    /// Run one sweep at the current time.
    pub async fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let evicted = self.registry.evict_idle(self.config.timeout, now).await;

        let live = self.registry.device_ids();
        let refreshed = self.presence.refresh(&live).await;
        let live: HashSet<String> = live.into_iter().collect();
        let stale_markers = self.presence.reconcile(&live).await;

        let expired_requests = self
            .config
            .pending_ttl
            .map_or(0, |ttl| self.correlator.expire(ttl, now).len());

        let report = SweepReport {
            evicted,
            refreshed,
            stale_markers,
            expired_requests,
        };
        if report.evicted.is_empty() && report.expired_requests == 0 && report.stale_markers == 0 {
            debug!(live = report.refreshed, "liveness sweep");
        } else {
            info!(
                evicted = report.evicted.len(),
                stale_markers = report.stale_markers,
                expired_requests = report.expired_requests,
                "liveness sweep"
            );
        }
        report
    }

    /// Sweep every `scan_interval` until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = time::interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick
        let _ = ticker.tick().await;

        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            timeout_secs = self.config.timeout.as_secs(),
            "liveness monitor started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.sweep().await;
                }
                () = cancel.cancelled() => {
                    info!("liveness monitor stopped");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::RequestKind;
    use crate::registry::testing::{Fixture, connection};
    use crate::stores::PresenceStore;
    use hoist_core::{ControlPlaneEvent, PresenceStatus};

    fn monitor(fx: &Fixture, correlator: Arc<RequestCorrelator>, config: LivenessConfig) -> LivenessMonitor {
        let tracker = PresenceTracker::new(fx.presence.clone(), Duration::from_secs(60));
        LivenessMonitor::new(fx.registry.clone(), correlator, tracker, config)
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_is_evicted_and_closed() {
        let fx = Fixture::new();
        let (conn, _rx) = connection("E1");
        let _ = fx.registry.register(conn.clone()).await;
        let m = monitor(&fx, Arc::new(RequestCorrelator::new()), LivenessConfig::default());

        time::advance(Duration::from_secs(31)).await;
        let report = m.sweep().await;

        assert_eq!(report.evicted, vec!["E1"]);
        assert!(conn.is_closed());
        assert!(fx.registry.lookup("E1").is_none());
        assert!(fx.presence.online_devices().await.unwrap().is_empty());

        let events = fx.control_plane.wait_for(2).await;
        assert!(events.iter().any(|e| matches!(
            e,
            ControlPlaneEvent::Presence(p) if p.status == PresenceStatus::Offline && p.device_id == "E1"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn active_device_survives_and_marker_is_refreshed() {
        let fx = Fixture::new();
        let (conn, _rx) = connection("E1");
        let _ = fx.registry.register(conn.clone()).await;
        let m = monitor(&fx, Arc::new(RequestCorrelator::new()), LivenessConfig::default());

        for _ in 0..10 {
            time::advance(Duration::from_secs(10)).await;
            assert!(fx.registry.touch("E1"));
            let report = m.sweep().await;
            assert!(report.evicted.is_empty());
            assert_eq!(report.refreshed, 1);
        }
        assert!(!conn.is_closed());
        assert_eq!(fx.presence.online_devices().await.unwrap(), vec!["E1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn orphan_marker_is_reconciled() {
        let fx = Fixture::new();
        fx.presence.mark_online("GHOST", Duration::from_secs(600)).await.unwrap();
        let m = monitor(&fx, Arc::new(RequestCorrelator::new()), LivenessConfig::default());

        let report = m.sweep().await;
        assert_eq!(report.stale_markers, 1);
        assert!(fx.presence.online_devices().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn old_pending_requests_expire() {
        let fx = Fixture::new();
        let correlator = Arc::new(RequestCorrelator::new());
        let _ = correlator.create("E1", RequestKind::Snapshot);
        let m = monitor(&fx, correlator.clone(), LivenessConfig::default());

        time::advance(Duration::from_secs(301)).await;
        assert_eq!(m.sweep().await.expired_requests, 1);
        assert!(correlator.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_ttl_keeps_pending_requests() {
        let fx = Fixture::new();
        let correlator = Arc::new(RequestCorrelator::new());
        let _ = correlator.create("E1", RequestKind::Snapshot);
        let config = LivenessConfig {
            pending_ttl: None,
            ..LivenessConfig::default()
        };
        let m = monitor(&fx, correlator.clone(), config);

        time::advance(Duration::from_secs(3_600)).await;
        assert_eq!(m.sweep().await.expired_requests, 0);
        assert_eq!(correlator.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_evicts_on_tick_and_stops_on_cancel() {
        let fx = Fixture::new();
        let (conn, _rx) = connection("E1");
        let _ = fx.registry.register(conn.clone()).await;
        let m = monitor(&fx, Arc::new(RequestCorrelator::new()), LivenessConfig::default());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(m.run(cancel.clone()));

        // Within timeout + one scan interval the session must be gone.
        time::sleep(Duration::from_secs(41)).await;
        assert!(conn.is_closed());
        assert!(fx.registry.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
