//! External collaborator settings: credentials, control plane, object store.

use std::collections::HashMap;
use std::time::Duration;

use hoist_core::constants::DEFAULT_PLACEHOLDER_URL;
use hoist_core::frames::SnapshotRequest;
use serde::{Deserialize, Serialize};

/// Device credential source.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Bound on a credential lookup.
    pub lookup_timeout_ms: u64,
    /// Static device id → token table.
    pub devices: HashMap<String, String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 2_000,
            devices: HashMap::new(),
        }
    }
}

impl AuthSettings {
    /// Lookup bound.
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Control-plane webhook.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlPlaneSettings {
    /// Base URL, e.g. `http://127.0.0.1:8000`. Unset means events are only logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Bound on one callback.
    pub timeout_ms: u64,
}

impl Default for ControlPlaneSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 5_000,
        }
    }
}

impl ControlPlaneSettings {
    /// Callback bound.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Snapshot object store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectStoreSettings {
    /// Upload endpoint; objects are `PUT` to `{baseUrl}/{key}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Public prefix for stored objects; defaults to `baseUrl`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    /// Bound on one upload.
    pub timeout_ms: u64,
    /// Reference reported when an upload is skipped or fails.
    pub placeholder_url: String,
}

impl Default for ObjectStoreSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            public_url: None,
            timeout_ms: 10_000,
            placeholder_url: DEFAULT_PLACEHOLDER_URL.into(),
        }
    }
}

impl ObjectStoreSettings {
    /// Upload bound.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Default shape of `snapshot_request` frames.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotSettings {
    /// Image format.
    pub format: String,
    /// Compression quality.
    pub quality: u32,
    /// `WIDTHxHEIGHT`.
    pub resolution: String,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        let request = SnapshotRequest::default();
        Self {
            format: request.format,
            quality: request.quality,
            resolution: request.resolution,
        }
    }
}

impl SnapshotSettings {
    /// Build the request payload.
    pub fn to_request(&self) -> SnapshotRequest {
        SnapshotRequest {
            format: self.format.clone(),
            quality: self.quality,
            resolution: self.resolution.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_store_defaults_to_placeholder() {
        let cfg = ObjectStoreSettings::default();
        assert!(cfg.base_url.is_none());
        assert_eq!(cfg.placeholder_url, DEFAULT_PLACEHOLDER_URL);
        assert_eq!(cfg.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn snapshot_defaults_match_wire_defaults() {
        assert_eq!(
            SnapshotSettings::default().to_request(),
            SnapshotRequest::default()
        );
    }

    #[test]
    fn unset_urls_are_not_serialized() {
        let value = serde_json::to_value(ControlPlaneSettings::default()).unwrap();
        assert!(value.get("baseUrl").is_none());
        assert_eq!(value["timeoutMs"], 5_000);
    }
}
