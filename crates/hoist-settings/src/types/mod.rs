//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file only needs the keys it overrides.

mod backends;
mod runtime;

pub use backends::*;
pub use runtime::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the gateway.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "liveness": { "timeoutSecs": 45 },
///   "auth": { "devices": { "ELEVATOR_SH_001": "test_token_123" } }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Listener and per-connection limits.
    pub server: ServerSettings,
    /// Liveness sweep timing.
    pub liveness: LivenessSettings,
    /// Pending request expiry.
    pub correlator: CorrelatorSettings,
    /// Background task queue sizing.
    pub workers: WorkerSettings,
    /// Device credential source.
    pub auth: AuthSettings,
    /// Control-plane webhook.
    pub control_plane: ControlPlaneSettings,
    /// Snapshot object store.
    pub object_store: ObjectStoreSettings,
    /// Default snapshot request shape.
    pub snapshot: SnapshotSettings,
}

impl GatewaySettings {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let liveness = &self.liveness;
        if liveness.scan_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "liveness.scanIntervalSecs must be positive".into(),
            ));
        }
        if liveness.timeout_secs <= liveness.scan_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "liveness.timeoutSecs ({}) must exceed liveness.scanIntervalSecs ({})",
                liveness.timeout_secs, liveness.scan_interval_secs
            )));
        }
        if liveness.presence_ttl_secs < liveness.scan_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "liveness.presenceTtlSecs ({}) must be at least liveness.scanIntervalSecs ({})",
                liveness.presence_ttl_secs, liveness.scan_interval_secs
            )));
        }
        if self.workers.count == 0 || self.workers.queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "workers.count and workers.queueCapacity must be positive".into(),
            ));
        }
        if self.server.outbound_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outboundBuffer must be positive".into(),
            ));
        }
        Ok(())
    }
}
