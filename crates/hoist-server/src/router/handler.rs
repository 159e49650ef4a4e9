//! Inbound frame dispatch.
//!
//! Everything here is synchronous: slow follow-up work (snapshot uploads,
//! control-plane callbacks) is queued on the gateway's task queue so the
//! read loop is never held up.

use hoist_core::frames::{CommandResultPayload, DeviceResponse, SnapshotPayload, Telemetry, frame_types};
use hoist_core::{CommandResultEvent, ControlPlaneEvent, InboundFrame, OutboundFrame};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::correlator::RequestKind;
use crate::gateway::Gateway;
use crate::metrics::DEVICE_FRAMES_TOTAL;
use crate::registry::DeviceConnection;
use crate::snapshots::{SnapshotJob, effective_ts};

/// Handle one classified frame from `connection`.
///
/// Never fails: frames that cannot be acted on are logged and dropped.
pub fn route_frame(gateway: &Gateway, connection: &DeviceConnection, frame: InboundFrame) {
    let device_id = connection.device_id();
    counter!(DEVICE_FRAMES_TOTAL, "type" => frame_label(&frame)).increment(1);

    match frame {
        InboundFrame::Heartbeat => {
            if let Err(e) = connection.send(&OutboundFrame::Pong) {
                debug!(device_id, error = %e, "pong not queued");
            }
        }
        InboundFrame::Telemetry(Telemetry { kind, payload }) => {
            gateway.telemetry().record(device_id, &kind, payload.as_deref());
        }
        InboundFrame::SnapshotResponse(response) => handle_snapshot(gateway, device_id, response),
        InboundFrame::CommandResponse(response) => handle_command_result(gateway, device_id, &response),
        InboundFrame::Unknown(frame_type) => {
            info!(device_id, frame_type = %frame_type, "ignoring unknown frame type");
        }
    }
}

/// Metric label with bounded cardinality.
fn frame_label(frame: &InboundFrame) -> &'static str {
    match frame {
        InboundFrame::Heartbeat => frame_types::HEARTBEAT,
        InboundFrame::Telemetry(t) if t.kind == frame_types::LOG => frame_types::LOG,
        InboundFrame::Telemetry(_) => frame_types::TELEMETRY,
        InboundFrame::SnapshotResponse(_) => frame_types::SNAPSHOT_RESPONSE,
        InboundFrame::CommandResponse(_) => frame_types::COMMAND_RESPONSE,
        InboundFrame::Unknown(_) => "unknown",
    }
}

fn handle_snapshot(gateway: &Gateway, device_id: &str, response: DeviceResponse) {
    let Some(req_id) = response.request_id.as_deref() else {
        debug!(device_id, "snapshot_response without req_id, dropped");
        return;
    };
    if gateway
        .correlator()
        .resolve(req_id, device_id, RequestKind::Snapshot)
        .is_none()
    {
        debug!(device_id, req_id, "no pending snapshot request, dropped");
        return;
    }

    let payload: SnapshotPayload = match response.decode(frame_types::SNAPSHOT_RESPONSE) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(device_id, req_id, error = %e, "invalid snapshot payload");
            return;
        }
    };

    let job = SnapshotJob {
        device_id: device_id.to_owned(),
        req_id: req_id.to_owned(),
        ts: effective_ts(response.ts),
        payload,
    };
    let uploader = gateway.snapshots().clone();
    let notifier = gateway.notifier().clone();
    let queued = gateway.tasks().submit("snapshot_upload", async move {
        let _ = uploader.process(job, &notifier).await;
    });
    if queued {
        debug!(device_id, req_id, "snapshot upload queued");
    }
}

fn handle_command_result(gateway: &Gateway, device_id: &str, response: &DeviceResponse) {
    let payload: CommandResultPayload = match response.decode(frame_types::COMMAND_RESPONSE) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(device_id, error = %e, "invalid command_response payload");
            return;
        }
    };

    let cmd_id = payload
        .cmd_id
        .filter(|id| !id.is_empty())
        .or_else(|| response.request_id.clone());
    let Some(cmd_id) = cmd_id else {
        debug!(device_id, "command_response without cmd_id, dropped");
        return;
    };
    if gateway
        .correlator()
        .resolve(&cmd_id, device_id, RequestKind::Command)
        .is_none()
    {
        debug!(device_id, cmd_id = %cmd_id, "no pending command, dropped");
        return;
    }

    info!(device_id, cmd_id = %cmd_id, status = %payload.status, "command acknowledged");
    let _ = gateway
        .notifier()
        .dispatch(ControlPlaneEvent::CommandResult(CommandResultEvent {
            device_id: device_id.to_owned(),
            cmd_id,
            status: payload.status,
            result: payload.result,
        }));
}
