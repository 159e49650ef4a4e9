//! # hoist-core
//!
//! Shared vocabulary for the hoist device gateway.
//!
//! - **Ids**: `RequestId`, `ConnectionId` newtypes (UUID v7)
//! - **Frames**: the inbound envelope, classified into a tagged union with
//!   deferred payload decoding, and the outbound frames sent to devices
//! - **Events**: control-plane callback payloads
//! - **Errors**: `thiserror` enums for frames, payloads, stores, and delivery
//! - **Logging**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod events;
pub mod frames;
pub mod ids;
pub mod logging;

pub use errors::{DeliveryError, FrameError, PayloadError, StoreError};
pub use events::{CommandResultEvent, ControlPlaneEvent, PresenceEvent, PresenceStatus, SnapshotEvent};
pub use frames::{InboundEnvelope, InboundFrame, OutboundFrame};
pub use ids::{ConnectionId, RequestId};
