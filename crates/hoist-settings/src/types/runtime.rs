//! Listener, liveness, correlator, and worker settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Listener and per-connection limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` auto-assigns).
    pub port: u16,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before writes are refused.
    pub outbound_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            outbound_buffer: 256,
        }
    }
}

/// Liveness sweep timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LivenessSettings {
    /// Seconds between sweeps.
    pub scan_interval_secs: u64,
    /// Seconds of silence after which a session is evicted.
    pub timeout_secs: u64,
    /// Expiry of the external presence marker.
    pub presence_ttl_secs: u64,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 10,
            timeout_secs: 30,
            presence_ttl_secs: 60,
        }
    }
}

impl LivenessSettings {
    /// Sweep interval.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Inactivity threshold.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Presence marker expiry.
    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl_secs)
    }
}

/// Pending request expiry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorrelatorSettings {
    /// Seconds a request may stay unanswered. `0` keeps requests forever.
    pub pending_ttl_secs: u64,
}

impl Default for CorrelatorSettings {
    fn default() -> Self {
        Self {
            pending_ttl_secs: 300,
        }
    }
}

impl CorrelatorSettings {
    /// `None` when expiry is disabled.
    pub fn pending_ttl(&self) -> Option<Duration> {
        (self.pending_ttl_secs > 0).then(|| Duration::from_secs(self.pending_ttl_secs))
    }
}

/// Background task queue sizing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerSettings {
    /// Worker tasks draining the queue.
    pub count: usize,
    /// Jobs that may wait before submissions are rejected.
    pub queue_capacity: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            count: 4,
            queue_capacity: 1024,
        }
    }
}
