//! Per-connection read loop and inbound frame dispatch.

pub mod handler;
pub mod session;

pub use handler::route_frame;
pub use session::run_device_session;
