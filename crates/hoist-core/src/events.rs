//! Control-plane callback payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Device presence as reported to the control plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// A session was registered.
    Online,
    /// A session was torn down or evicted.
    Offline,
}

impl PresenceStatus {
    /// Wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// `{device_id, status, event_time}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    /// Device whose presence changed.
    pub device_id: String,
    /// New presence.
    pub status: PresenceStatus,
    /// Unix seconds at which the gateway observed the change.
    pub event_time: i64,
}

impl PresenceEvent {
    /// Build an event stamped with the current time.
    pub fn now(device_id: impl Into<String>, status: PresenceStatus) -> Self {
        Self {
            device_id: device_id.into(),
            status,
            event_time: chrono::Utc::now().timestamp(),
        }
    }
}

/// `{device_id, req_id, snapshot_url}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEvent {
    /// Device that produced the snapshot.
    pub device_id: String,
    /// Request the snapshot answers.
    pub req_id: String,
    /// Stored object URL, or the placeholder when the upload failed.
    pub snapshot_url: String,
}

/// `{device_id, cmd_id, status, result}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResultEvent {
    /// Device that executed the command.
    pub device_id: String,
    /// Command id the result answers.
    pub cmd_id: String,
    /// Device-reported status.
    pub status: String,
    /// Free-form result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Anything delivered to the control plane.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlPlaneEvent {
    /// Online/offline transition.
    Presence(PresenceEvent),
    /// Completed snapshot request.
    Snapshot(SnapshotEvent),
    /// Completed command.
    CommandResult(CommandResultEvent),
}

impl ControlPlaneEvent {
    /// Label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Presence(_) => "presence",
            Self::Snapshot(_) => "snapshot",
            Self::CommandResult(_) => "command_result",
        }
    }

    /// Device the event is about.
    pub fn device_id(&self) -> &str {
        match self {
            Self::Presence(e) => &e.device_id,
            Self::Snapshot(e) => &e.device_id,
            Self::CommandResult(e) => &e.device_id,
        }
    }
}
