//! The authoritative map of device id → live connection.
//!
//! At most one connection is registered per device. Registering a device
//! that already has a connection closes and replaces the old one. Presence
//! updates and control-plane notifications always run after the map lock
//! has been released.

pub mod connection;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use hoist_core::{ConnectionId, PresenceStatus};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

pub use connection::DeviceConnection;

use crate::metrics::{DEVICE_CONNECTIONS_ACTIVE, DEVICE_EVICTIONS_TOTAL};
use crate::notify::NotificationDispatcher;
use crate::stores::PresenceTracker;

#[allow(clippy::cast_precision_loss)]
fn record_active(len: usize) {
    gauge!(DEVICE_CONNECTIONS_ACTIVE).set(len as f64);
}

/// Registry of live device connections.
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, Arc<DeviceConnection>>>,
    presence: PresenceTracker,
    notifier: NotificationDispatcher,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new(presence: PresenceTracker, notifier: NotificationDispatcher) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            presence,
            notifier,
        }
    }

    /// Store `connection` as the live session for its device.
    ///
    /// Any previous connection for the same device is closed and returned.
    /// The device is marked online and an online notification is queued.
    pub async fn register(&self, connection: Arc<DeviceConnection>) -> Option<Arc<DeviceConnection>> {
        let device_id = connection.device_id();
        let previous = {
            let mut sessions = self.sessions.write();
            let previous = sessions.insert(device_id.to_owned(), connection.clone());
            record_active(sessions.len());
            previous
        };

        if let Some(old) = &previous {
            if old.close() {
                info!(
                    device_id,
                    old_conn_id = %old.conn_id(),
                    new_conn_id = %connection.conn_id(),
                    "superseded existing connection"
                );
            }
        }

        let _ = self.presence.online(device_id).await;
        let _ = self.notifier.presence(device_id, PresenceStatus::Online);
        info!(device_id, conn_id = %connection.conn_id(), "device registered");
        previous
    }

    /// Remove whatever connection `device_id` has. No-op when absent.
    pub async fn unregister(&self, device_id: &str) -> bool {
        let removed = {
            let mut sessions = self.sessions.write();
            let removed = sessions.remove(device_id);
            record_active(sessions.len());
            removed
        };
        match removed {
            Some(connection) => {
                self.teardown(&connection).await;
                true
            }
            None => false,
        }
    }

    /// Remove `device_id` only if its live connection is `conn_id`.
    ///
    /// Used by a session's read loop on exit, so a connection that was
    /// already superseded never removes its replacement.
    pub async fn unregister_connection(&self, device_id: &str, conn_id: &ConnectionId) -> bool {
        let removed = {
            let mut sessions = self.sessions.write();
            match sessions.get(device_id) {
                Some(current) if current.conn_id() == conn_id => {
                    let removed = sessions.remove(device_id);
                    record_active(sessions.len());
                    removed
                }
                _ => None,
            }
        };
        match removed {
            Some(connection) => {
                self.teardown(&connection).await;
                true
            }
            None => {
                debug!(device_id, %conn_id, "connection already replaced or removed");
                false
            }
        }
    }

    /// Live connection for `device_id`.
    pub fn lookup(&self, device_id: &str) -> Option<Arc<DeviceConnection>> {
        self.sessions.read().get(device_id).cloned()
    }

    /// Record activity for `device_id`. Never creates a session.
    pub fn touch(&self, device_id: &str) -> bool {
        match self.sessions.read().get(device_id) {
            Some(connection) => {
                connection.touch();
                true
            }
            None => false,
        }
    }

    /// Evict every session idle for longer than `timeout` as of `now`.
    ///
    /// Returns the evicted device ids.
    pub async fn evict_idle(&self, timeout: Duration, now: Instant) -> Vec<String> {
        let evicted: Vec<Arc<DeviceConnection>> = {
            let mut sessions = self.sessions.write();
            let stale: Vec<String> = sessions
                .iter()
                .filter(|(_, c)| c.idle_for(now) > timeout)
                .map(|(id, _)| id.clone())
                .collect();
            let evicted = stale.iter().filter_map(|id| sessions.remove(id)).collect();
            record_active(sessions.len());
            evicted
        };

        for connection in &evicted {
            info!(
                device_id = connection.device_id(),
                conn_id = %connection.conn_id(),
                idle_secs = connection.idle_for(now).as_secs(),
                "evicting idle device"
            );
            counter!(DEVICE_EVICTIONS_TOTAL).increment(1);
        }
        let _ = join_all(evicted.iter().map(|c| self.teardown(c))).await;

        evicted.iter().map(|c| c.device_id().to_owned()).collect()
    }

    /// Device ids with a live session, sorted.
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Live session count.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no device is connected.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Close and remove every session.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<DeviceConnection>> = {
            let mut sessions = self.sessions.write();
            let drained = sessions.drain().map(|(_, c)| c).collect();
            record_active(0);
            drained
        };
        let _ = join_all(drained.iter().map(|c| self.teardown(c))).await;
        drained.len()
    }

    async fn teardown(&self, connection: &DeviceConnection) {
        let device_id = connection.device_id();
        let _ = connection.close();
        let _ = self.presence.offline(device_id).await;
        let _ = self.notifier.presence(device_id, PresenceStatus::Offline);
        info!(device_id, conn_id = %connection.conn_id(), "device unregistered");
    }
}
