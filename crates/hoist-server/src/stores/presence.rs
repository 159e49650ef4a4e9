//! Advisory presence markers.
//!
//! The registry owns connection lifecycle; markers only answer fleet-wide
//! "who is online" queries and may lag the registry by one liveness tick.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use hoist_core::StoreError;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

const STORE: &str = "presence store";

/// Default bound on one presence call.
pub const DEFAULT_PRESENCE_TIMEOUT: Duration = Duration::from_secs(2);

/// External store of expiring `device id → online` markers.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Create or extend the marker for `device_id`.
    async fn mark_online(&self, device_id: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Delete the marker for `device_id`. Deleting a missing marker succeeds.
    async fn mark_offline(&self, device_id: &str) -> Result<(), StoreError>;

    /// Devices with an unexpired marker.
    async fn online_devices(&self) -> Result<Vec<String>, StoreError>;
}

/// In-process presence store with per-marker expiry.
#[derive(Default)]
pub struct MemoryPresenceStore {
    markers: Mutex<HashMap<String, Instant>>,
}

impl MemoryPresenceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn mark_online(&self, device_id: &str, ttl: Duration) -> Result<(), StoreError> {
        let _ = self
            .markers
            .lock()
            .insert(device_id.to_owned(), Instant::now() + ttl);
        Ok(())
    }

    async fn mark_offline(&self, device_id: &str) -> Result<(), StoreError> {
        let _ = self.markers.lock().remove(device_id);
        Ok(())
    }

    async fn online_devices(&self) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let mut markers = self.markers.lock();
        markers.retain(|_, expires_at| *expires_at > now);
        let mut devices: Vec<String> = markers.keys().cloned().collect();
        devices.sort();
        Ok(devices)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tracker
// ─────────────────────────────────────────────────────────────────────────────

/// Bounded, best-effort access to a [`PresenceStore`].
///
/// Every call is wrapped in a timeout. Write failures are logged and
/// swallowed; read failures degrade to an empty fleet.
#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn PresenceStore>,
    ttl: Duration,
    timeout: Duration,
}

impl PresenceTracker {
    /// Wrap `store`, writing markers that expire after `ttl`.
    pub fn new(store: Arc<dyn PresenceStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            timeout: DEFAULT_PRESENCE_TIMEOUT,
        }
    }

    /// Override the per-call bound.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Marker expiry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mark `device_id` online. Returns whether the store accepted it.
    pub async fn online(&self, device_id: &str) -> bool {
        self.bounded(device_id, "mark_online", self.store.mark_online(device_id, self.ttl))
            .await
            .is_some()
    }

    /// Delete the marker for `device_id`. Returns whether the store accepted it.
    pub async fn offline(&self, device_id: &str) -> bool {
        self.bounded(device_id, "mark_offline", self.store.mark_offline(device_id))
            .await
            .is_some()
    }

    /// Extend the markers of every device in `device_ids`; returns how many succeeded.
    pub async fn refresh(&self, device_ids: &[String]) -> usize {
        join_all(device_ids.iter().map(|id| self.online(id)))
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count()
    }

    /// Delete markers of devices that are not in `live`; returns how many were removed.
    pub async fn reconcile(&self, live: &HashSet<String>) -> usize {
        let Some(marked) = self
            .bounded("*", "online_devices", self.store.online_devices())
            .await
        else {
            return 0;
        };
        let stale: Vec<&String> = marked.iter().filter(|id| !live.contains(*id)).collect();
        if !stale.is_empty() {
            debug!(count = stale.len(), "removing stale presence markers");
        }
        join_all(stale.into_iter().map(|id| self.offline(id)))
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count()
    }

    /// Devices the store reports online; empty when the store is unreachable.
    pub async fn online_devices(&self) -> Vec<String> {
        self.bounded("*", "online_devices", self.store.online_devices())
            .await
            .unwrap_or_default()
    }

    async fn bounded<T>(
        &self,
        device_id: &str,
        op: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Option<T> {
        let err = match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(err)) => err,
            Err(_) => StoreError::Timeout {
                store: STORE,
                timeout: self.timeout,
            },
        };
        warn!(device_id, op, error = %err, "presence update failed");
        None
    }
}
