//! Sink for device log and telemetry reports.

use serde_json::value::RawValue;
use tracing::info;

/// Receiver of `log`/`telemetry` frames.
///
/// Called from the device read loop, so implementations must not block.
pub trait TelemetrySink: Send + Sync {
    /// Record one report.
    fn record(&self, device_id: &str, kind: &str, payload: Option<&RawValue>);
}

/// Emits each report as a `tracing` event on target `hoist::telemetry`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn record(&self, device_id: &str, kind: &str, payload: Option<&RawValue>) {
        info!(
            target: "hoist::telemetry",
            device_id,
            kind,
            payload = payload.map_or("null", RawValue::get),
            "device report"
        );
    }
}
