//! # hoist-server
//!
//! Device gateway core and its Axum HTTP + `WebSocket` surface.
//!
//! - Connection registry: one live session per device, superseded sessions closed
//! - Protocol router: per-connection ordered read loop with tagged frame dispatch
//! - Request correlator: pending snapshot/command requests matched to responses
//! - Liveness monitor: idle-session eviction and presence reconciliation
//! - Notification dispatcher: best-effort control-plane callbacks on a bounded task queue
//! - Auth validator: fail-closed credential check before upgrade
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod correlator;
pub mod gateway;
pub mod health;
pub mod liveness;
pub mod metrics;
pub mod notify;
pub mod registry;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod snapshots;
pub mod stores;
pub mod tasks;

pub use gateway::{Gateway, GatewayBuilder};
pub use server::GatewayServer;
