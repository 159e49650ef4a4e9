//! Device wire protocol.
//!
//! Inbound text frames are JSON envelopes `{type, device_id, req_id, ts,
//! payload}`. The envelope is parsed first with the payload kept as raw JSON;
//! [`InboundEnvelope::into_frame`] then classifies it by `type` into an
//! [`InboundFrame`], and only the handler for that variant decodes the payload
//! into its concrete shape.
//!
//! Outbound frames are [`OutboundFrame`] values, serialized with the same
//! `type` tag.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;

use crate::errors::{FrameError, PayloadError};

/// Frame `type` strings.
pub mod frame_types {
    /// Device keep-alive.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Play-log report.
    pub const LOG: &str = "log";
    /// Generic telemetry report.
    pub const TELEMETRY: &str = "telemetry";
    /// Answer to a `snapshot_request`.
    pub const SNAPSHOT_RESPONSE: &str = "snapshot_response";
    /// Answer to a `command`.
    pub const COMMAND_RESPONSE: &str = "command_response";
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Raw inbound envelope with the payload left undecoded.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    /// Frame type tag.
    #[serde(rename = "type")]
    pub frame_type: String,
    /// Device id as declared by the device. Informational only; the
    /// authenticated connection decides which device a frame belongs to.
    #[serde(default)]
    pub device_id: Option<String>,
    /// Correlation id for responses.
    #[serde(default)]
    pub req_id: Option<String>,
    /// Device-side timestamp.
    #[serde(default)]
    pub ts: Option<i64>,
    /// Type-specific payload, decoded later.
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
}

impl InboundEnvelope {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a binary frame carrying UTF-8 JSON.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)?;
        Self::parse(text)
    }

    /// Classify by `type`.
    pub fn into_frame(self) -> InboundFrame {
        let request_id = self.req_id.filter(|id| !id.is_empty());
        match self.frame_type.as_str() {
            frame_types::HEARTBEAT => InboundFrame::Heartbeat,
            frame_types::LOG | frame_types::TELEMETRY => InboundFrame::Telemetry(Telemetry {
                kind: self.frame_type,
                payload: self.payload,
            }),
            frame_types::SNAPSHOT_RESPONSE => InboundFrame::SnapshotResponse(DeviceResponse {
                request_id,
                ts: self.ts,
                payload: self.payload,
            }),
            frame_types::COMMAND_RESPONSE => InboundFrame::CommandResponse(DeviceResponse {
                request_id,
                ts: self.ts,
                payload: self.payload,
            }),
            _ => InboundFrame::Unknown(self.frame_type),
        }
    }
}

/// Inbound frame after classification.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// Keep-alive; acknowledged with a `pong`.
    Heartbeat,
    /// Log or telemetry report, handed to a sink.
    Telemetry(Telemetry),
    /// Answer to a snapshot request.
    SnapshotResponse(DeviceResponse),
    /// Answer to a command.
    CommandResponse(DeviceResponse),
    /// Anything else; carries the unrecognised type.
    Unknown(String),
}

impl InboundFrame {
    /// Label used for logs and metrics.
    pub fn label(&self) -> &str {
        match self {
            Self::Heartbeat => frame_types::HEARTBEAT,
            Self::Telemetry(t) => &t.kind,
            Self::SnapshotResponse(_) => frame_types::SNAPSHOT_RESPONSE,
            Self::CommandResponse(_) => frame_types::COMMAND_RESPONSE,
            Self::Unknown(_) => "unknown",
        }
    }
}

/// A log/telemetry report.
#[derive(Debug, Clone)]
pub struct Telemetry {
    /// `log` or `telemetry`.
    pub kind: String,
    /// Opaque report body.
    pub payload: Option<Box<RawValue>>,
}

/// A response frame awaiting correlation.
#[derive(Debug, Clone)]
pub struct DeviceResponse {
    /// `req_id` from the envelope (empty strings become `None`).
    pub request_id: Option<String>,
    /// Device-side timestamp.
    pub ts: Option<i64>,
    /// Undecoded payload.
    pub payload: Option<Box<RawValue>>,
}

impl DeviceResponse {
    /// Decode the payload into its concrete shape.
    pub fn decode<T: DeserializeOwned>(&self, frame_type: &'static str) -> Result<T, PayloadError> {
        let raw = self
            .payload
            .as_ref()
            .ok_or(PayloadError::Missing { frame_type })?;
        Ok(serde_json::from_str(raw.get())?)
    }
}

/// Payload of a `snapshot_response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPayload {
    /// Image format (`jpg`, `png`, ...).
    #[serde(default)]
    pub format: String,
    /// Compression quality.
    #[serde(default)]
    pub quality: Option<u32>,
    /// `WIDTHxHEIGHT`.
    #[serde(default)]
    pub resolution: Option<String>,
    /// Base64 image bytes, optionally as a `data:` URI.
    pub data: String,
}

impl SnapshotPayload {
    /// Decode the base64 image data.
    pub fn decode_data(&self) -> Result<Vec<u8>, PayloadError> {
        let data = self.data.trim();
        let data = data
            .split_once("base64,")
            .map_or(data, |(_, encoded)| encoded);
        Ok(STANDARD.decode(data)?)
    }

    /// File extension for the object key.
    pub fn extension(&self) -> &'static str {
        match self.format.to_ascii_lowercase().as_str() {
            "" | "jpg" | "jpeg" => "jpg",
            "png" => "png",
            "webp" => "webp",
            _ => "bin",
        }
    }

    /// MIME type matching [`Self::extension`].
    pub fn content_type(&self) -> &'static str {
        match self.extension() {
            "jpg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            _ => "application/octet-stream",
        }
    }
}

/// Payload of a `command_response`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandResultPayload {
    /// Command id echoed back by the device.
    #[serde(default)]
    pub cmd_id: Option<String>,
    /// Device-reported status (`success`, `failed`, ...).
    #[serde(default)]
    pub status: String,
    /// Free-form result.
    #[serde(default)]
    pub result: Option<Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Requested snapshot shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRequest {
    /// Image format.
    pub format: String,
    /// Compression quality.
    pub quality: u32,
    /// `WIDTHxHEIGHT`.
    pub resolution: String,
}

impl Default for SnapshotRequest {
    fn default() -> Self {
        Self {
            format: "jpg".into(),
            quality: 80,
            resolution: "1920x1080".into(),
        }
    }
}

/// Frame written to a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Heartbeat acknowledgement.
    Pong,
    /// Control-plane command.
    Command {
        /// Correlation id for the `command_response`.
        cmd_id: String,
        /// Command verb, e.g. `REBOOT`.
        payload: String,
        /// Command arguments, passed through untouched.
        data: Value,
    },
    /// Ask the device for a screen snapshot.
    SnapshotRequest {
        /// Correlation id for the `snapshot_response`.
        req_id: String,
        /// Requested shape.
        payload: SnapshotRequest,
    },
}

impl OutboundFrame {
    /// Serialize to the JSON text written on the socket.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn heartbeat_without_optional_fields() {
        let env = InboundEnvelope::parse(r#"{"type":"heartbeat","payload":"ping"}"#).unwrap();
        assert!(env.device_id.is_none());
        assert_matches!(env.into_frame(), InboundFrame::Heartbeat);
    }

    #[test]
    fn log_and_telemetry_go_to_telemetry() {
        for kind in ["log", "telemetry"] {
            let text = format!(r#"{{"type":"{kind}","payload":"playing Ad_1.mp4"}}"#);
            let frame = InboundEnvelope::parse(&text).unwrap().into_frame();
            assert_matches!(frame, InboundFrame::Telemetry(ref t) if t.kind == kind);
            assert_eq!(frame.label(), kind);
        }
    }

    #[test]
    fn snapshot_response_keeps_raw_payload() {
        let text = r#"{"type":"snapshot_response","device_id":"E1","req_id":"R1","ts":1700,"payload":{"format":"png","data":"aGk="}}"#;
        let frame = InboundEnvelope::parse(text).unwrap().into_frame();
        let InboundFrame::SnapshotResponse(resp) = frame else {
            panic!("expected snapshot response");
        };
        assert_eq!(resp.request_id.as_deref(), Some("R1"));
        assert_eq!(resp.ts, Some(1700));
        let payload: SnapshotPayload = resp.decode(frame_types::SNAPSHOT_RESPONSE).unwrap();
        assert_eq!(payload.decode_data().unwrap(), b"hi");
        assert_eq!(payload.extension(), "png");
        assert_eq!(payload.content_type(), "image/png");
    }

    #[test]
    fn empty_req_id_is_none() {
        let text = r#"{"type":"command_response","req_id":"","payload":{"cmd_id":"C1","status":"success"}}"#;
        let InboundFrame::CommandResponse(resp) = InboundEnvelope::parse(text).unwrap().into_frame()
        else {
            panic!("expected command response");
        };
        assert!(resp.request_id.is_none());
        let payload: CommandResultPayload = resp.decode(frame_types::COMMAND_RESPONSE).unwrap();
        assert_eq!(payload.cmd_id.as_deref(), Some("C1"));
        assert_eq!(payload.status, "success");
    }

    #[test]
    fn unknown_type_is_preserved() {
        let frame = InboundEnvelope::parse(r#"{"type":"firmware_report"}"#)
            .unwrap()
            .into_frame();
        assert_matches!(frame, InboundFrame::Unknown(ref t) if t == "firmware_report");
    }

    #[test]
    fn missing_type_is_a_frame_error() {
        let err = InboundEnvelope::parse(r#"{"payload":1}"#).unwrap_err();
        assert_matches!(err, FrameError::Json(_));
    }

    #[test]
    fn non_utf8_binary_is_rejected() {
        let err = InboundEnvelope::parse_bytes(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert_matches!(err, FrameError::InvalidUtf8);
    }

    #[test]
    fn decode_without_payload_is_missing() {
        let resp = DeviceResponse {
            request_id: Some("R1".into()),
            ts: None,
            payload: None,
        };
        let err = resp
            .decode::<SnapshotPayload>(frame_types::SNAPSHOT_RESPONSE)
            .unwrap_err();
        assert_matches!(err, PayloadError::Missing { .. });
    }

    #[test]
    fn snapshot_data_uri_prefix_is_stripped() {
        let payload = SnapshotPayload {
            format: "JPEG".into(),
            quality: None,
            resolution: None,
            data: "data:image/jpeg;base64,aGk=".into(),
        };
        assert_eq!(payload.decode_data().unwrap(), b"hi");
        assert_eq!(payload.extension(), "jpg");
    }

    #[test]
    fn invalid_base64_is_payload_error() {
        let payload = SnapshotPayload {
            format: String::new(),
            quality: None,
            resolution: None,
            data: "%%%".into(),
        };
        assert_matches!(payload.decode_data(), Err(PayloadError::Base64(_)));
        assert_eq!(payload.extension(), "jpg");
    }

    #[test]
    fn outbound_frames_are_type_tagged() {
        assert_eq!(OutboundFrame::Pong.to_json().unwrap(), r#"{"type":"pong"}"#);

        let cmd = OutboundFrame::Command {
            cmd_id: "C1".into(),
            payload: "REBOOT".into(),
            data: json!("force=true"),
        };
        let value: Value = serde_json::from_str(&cmd.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "command");
        assert_eq!(value["payload"], "REBOOT");
        assert_eq!(value["cmd_id"], "C1");
        assert_eq!(value["data"], "force=true");

        let snap = OutboundFrame::SnapshotRequest {
            req_id: "R1".into(),
            payload: SnapshotRequest::default(),
        };
        let value: Value = serde_json::from_str(&snap.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "snapshot_request");
        assert_eq!(value["req_id"], "R1");
        assert_eq!(value["payload"]["quality"], 80);
        assert_eq!(value["payload"]["resolution"], "1920x1080");
    }
}
