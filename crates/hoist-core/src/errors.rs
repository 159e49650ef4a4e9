//! Error types shared across the gateway.
//!
//! - [`FrameError`]: an inbound frame could not be read as an envelope. Fatal
//!   to the connection that produced it.
//! - [`PayloadError`]: a type-specific payload could not be decoded. Logged,
//!   never fatal.
//! - [`StoreError`]: an external store (credentials, presence, objects,
//!   control plane) failed or timed out.
//! - [`DeliveryError`]: an outbound frame could not be handed to a device.

use std::time::Duration;

use thiserror::Error;

/// An inbound frame that cannot be turned into an envelope.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Binary frame that is not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
    /// Text that is not a JSON envelope.
    #[error("invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A type-specific payload that cannot be decoded.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The frame carried no payload at all.
    #[error("{frame_type} frame has no payload")]
    Missing {
        /// Frame type that required a payload.
        frame_type: &'static str,
    },
    /// The payload did not match the expected shape.
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
    /// Binary data was not valid base64.
    #[error("invalid base64 data: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Failure of an external collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The call did not complete within its bound.
    #[error("{store} timed out after {timeout:?}")]
    Timeout {
        /// Which store timed out.
        store: &'static str,
        /// The bound that elapsed.
        timeout: Duration,
    },
    /// The store could not be reached or returned a transport error.
    #[error("{store} unavailable: {message}")]
    Unavailable {
        /// Which store failed.
        store: &'static str,
        /// Underlying error text.
        message: String,
    },
    /// The store answered with a non-success status.
    #[error("{store} rejected request with status {status}")]
    Status {
        /// Which store answered.
        store: &'static str,
        /// HTTP status code.
        status: u16,
    },
}

impl StoreError {
    /// Convenience constructor for transport failures.
    pub fn unavailable(store: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            store,
            message: err.to_string(),
        }
    }
}

/// An outbound frame that could not be handed to a device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// No live session for the device.
    #[error("device {0} is offline")]
    Offline(String),
    /// The connection's outbound queue is full.
    #[error("outbound queue for device {0} is full")]
    QueueFull(String),
    /// The connection is closing or already closed.
    #[error("connection for device {0} is closed")]
    Closed(String),
}
