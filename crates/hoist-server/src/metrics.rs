//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup, before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Device connections accepted (counter).
pub const DEVICE_CONNECTIONS_TOTAL: &str = "device_connections_total";
/// Registered device sessions (gauge).
pub const DEVICE_CONNECTIONS_ACTIVE: &str = "device_connections_active";
/// Sessions evicted by the liveness sweep (counter).
pub const DEVICE_EVICTIONS_TOTAL: &str = "device_evictions_total";
/// Inbound frames (counter, labels: type).
pub const DEVICE_FRAMES_TOTAL: &str = "device_frames_total";
/// Command pushes (counter, labels: outcome).
pub const COMMANDS_TOTAL: &str = "commands_total";
/// Outstanding correlated requests (gauge).
pub const PENDING_REQUESTS: &str = "pending_requests";
/// Control-plane notifications (counter, labels: outcome).
pub const NOTIFICATIONS_TOTAL: &str = "notifications_total";
/// Jobs refused by the task queue (counter, labels: reason).
pub const TASK_QUEUE_REJECTIONS_TOTAL: &str = "task_queue_rejections_total";
/// Snapshot uploads (counter, labels: outcome).
pub const SNAPSHOT_UPLOADS_TOTAL: &str = "snapshot_uploads_total";
