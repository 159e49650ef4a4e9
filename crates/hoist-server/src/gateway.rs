//! The gateway's shared state.
//!
//! [`Gateway`] owns one instance of every component and is handed (as
//! `Arc<Gateway>`) to each session and HTTP handler. Nothing is global, so
//! several gateways can run side by side in one process.

use std::sync::Arc;
use std::time::Duration;

use hoist_core::frames::SnapshotRequest;
use hoist_core::{DeliveryError, OutboundFrame, RequestId};
use hoist_settings::GatewaySettings;
use metrics::counter;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::auth::AuthValidator;
use crate::correlator::{RequestCorrelator, RequestKind};
use crate::liveness::{LivenessConfig, LivenessMonitor};
use crate::metrics::COMMANDS_TOTAL;
use crate::notify::NotificationDispatcher;
use crate::registry::{ConnectionRegistry, DeviceConnection};
use crate::snapshots::SnapshotUploader;
use crate::stores::{
    ControlPlane, CredentialStore, HttpControlPlane, HttpObjectStore, LogControlPlane, MemoryPresenceStore,
    ObjectStore, PresenceStore, PresenceTracker, StaticCredentialStore, TelemetrySink, TracingTelemetrySink,
};
use crate::tasks::TaskQueue;

/// Shared gateway components.
pub struct Gateway {
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<RequestCorrelator>,
    auth: AuthValidator,
    notifier: NotificationDispatcher,
    presence: PresenceTracker,
    snapshots: SnapshotUploader,
    telemetry: Arc<dyn TelemetrySink>,
    tasks: TaskQueue,
    snapshot_defaults: SnapshotRequest,
    liveness: LivenessConfig,
    outbound_buffer: usize,
    max_message_size: usize,
}

impl Gateway {
    /// Start building a gateway from settings.
    pub fn builder(settings: GatewaySettings) -> GatewayBuilder {
        GatewayBuilder::new(settings)
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The request correlator.
    pub fn correlator(&self) -> &Arc<RequestCorrelator> {
        &self.correlator
    }

    /// The device admission check.
    pub fn auth(&self) -> &AuthValidator {
        &self.auth
    }

    /// The control-plane dispatcher.
    pub fn notifier(&self) -> &NotificationDispatcher {
        &self.notifier
    }

    /// Presence marker access.
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// The snapshot upload pipeline.
    pub fn snapshots(&self) -> &SnapshotUploader {
        &self.snapshots
    }

    /// Sink for device reports.
    pub fn telemetry(&self) -> &Arc<dyn TelemetrySink> {
        &self.telemetry
    }

    /// Background job queue.
    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    /// Max inbound WebSocket message size.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Create a connection handle for an authenticated device.
    ///
    /// The handle is not registered yet.
    pub fn open_connection(&self, device_id: &str) -> (Arc<DeviceConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        (Arc::new(DeviceConnection::new(device_id, tx)), rx)
    }

    /// Liveness sweeper over this gateway's registry.
    pub fn liveness_monitor(&self) -> LivenessMonitor {
        LivenessMonitor::new(
            self.registry.clone(),
            self.correlator.clone(),
            self.presence.clone(),
            self.liveness,
        )
    }

    /// Push a control-plane command to a device.
    ///
    /// Returns the `cmd_id` the device will echo in its `command_response`.
    /// Offline devices fail immediately; nothing is retried.
    pub fn push_command(&self, device_id: &str, command: &str, data: Value) -> Result<RequestId, DeliveryError> {
        let Some(connection) = self.registry.lookup(device_id) else {
            counter!(COMMANDS_TOTAL, "outcome" => "offline").increment(1);
            return Err(DeliveryError::Offline(device_id.to_owned()));
        };

        let cmd_id = self.correlator.create(device_id, RequestKind::Command);
        let frame = OutboundFrame::Command {
            cmd_id: cmd_id.to_string(),
            payload: command.to_owned(),
            data,
        };
        match connection.send(&frame) {
            Ok(()) => {
                info!(device_id, command, %cmd_id, "command pushed");
                counter!(COMMANDS_TOTAL, "outcome" => "sent").increment(1);
                Ok(cmd_id)
            }
            Err(e) => {
                let _ = self.correlator.cancel(&cmd_id);
                warn!(device_id, command, error = %e, "command not delivered");
                counter!(COMMANDS_TOTAL, "outcome" => "failed").increment(1);
                Err(e)
            }
        }
    }

    /// Ask a device for a snapshot. Returns the request id without waiting
    /// for the device.
    pub fn request_snapshot(&self, device_id: &str) -> Result<RequestId, DeliveryError> {
        let connection = self
            .registry
            .lookup(device_id)
            .ok_or_else(|| DeliveryError::Offline(device_id.to_owned()))?;

        let req_id = self.correlator.create(device_id, RequestKind::Snapshot);
        let frame = OutboundFrame::SnapshotRequest {
            req_id: req_id.to_string(),
            payload: self.snapshot_defaults.clone(),
        };
        if let Err(e) = connection.send(&frame) {
            let _ = self.correlator.cancel(&req_id);
            warn!(device_id, error = %e, "snapshot request not delivered");
            return Err(e);
        }
        info!(device_id, %req_id, "snapshot requested");
        Ok(req_id)
    }

    /// Close every session and drain queued background work.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        let closed = self.registry.close_all().await;
        info!(closed, "closed device sessions");
        self.tasks.shutdown(drain_timeout).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a [`Gateway`]; collaborators not supplied are derived from settings.
pub struct GatewayBuilder {
    settings: GatewaySettings,
    credentials: Option<Arc<dyn CredentialStore>>,
    presence: Option<Arc<dyn PresenceStore>>,
    objects: Option<Arc<dyn ObjectStore>>,
    control_plane: Option<Arc<dyn ControlPlane>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    http: Option<reqwest::Client>,
}

impl GatewayBuilder {
    /// Start from `settings`.
    pub fn new(settings: GatewaySettings) -> Self {
        Self {
            settings,
            credentials: None,
            presence: None,
            objects: None,
            control_plane: None,
            telemetry: None,
            http: None,
        }
    }

    /// Use `store` instead of the static credential table.
    #[must_use]
    pub fn credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Use `store` for presence markers instead of the in-memory store.
    #[must_use]
    pub fn presence_store(mut self, store: Arc<dyn PresenceStore>) -> Self {
        self.presence = Some(store);
        self
    }

    /// Upload snapshots to `store` instead of the configured endpoint.
    #[must_use]
    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(store);
        self
    }

    /// Deliver events to `control_plane` instead of the configured webhook.
    #[must_use]
    pub fn control_plane(mut self, control_plane: Arc<dyn ControlPlane>) -> Self {
        self.control_plane = Some(control_plane);
        self
    }

    /// Send device reports to `sink` instead of the log.
    #[must_use]
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// Share `client` with the HTTP-backed stores.
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Assemble the gateway and start its worker pool.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Arc<Gateway> {
        let settings = self.settings;
        let http = self.http.unwrap_or_default();

        let credentials = self.credentials.unwrap_or_else(|| {
            Arc::new(StaticCredentialStore::new(settings.auth.devices.clone()))
        });

        let control_plane = self.control_plane.unwrap_or_else(|| {
            match settings.control_plane.base_url.as_deref() {
                Some(url) => {
                    info!(url, "control plane callbacks enabled");
                    Arc::new(HttpControlPlane::new(http.clone(), url, settings.control_plane.timeout()))
                }
                None => {
                    info!("no control plane configured, events are only logged");
                    Arc::new(LogControlPlane)
                }
            }
        });

        let objects = self.objects.or_else(|| {
            settings.object_store.base_url.as_deref().map(|url| {
                info!(url, "snapshot uploads enabled");
                Arc::new(HttpObjectStore::new(
                    http.clone(),
                    url,
                    settings.object_store.public_url.as_deref(),
                    settings.object_store.timeout(),
                )) as Arc<dyn ObjectStore>
            })
        });

        let presence_store = self
            .presence
            .unwrap_or_else(|| Arc::new(MemoryPresenceStore::new()));
        let presence = PresenceTracker::new(presence_store, settings.liveness.presence_ttl());

        let tasks = TaskQueue::start(settings.workers.count, settings.workers.queue_capacity);
        let notifier = NotificationDispatcher::new(control_plane, tasks.clone(), settings.control_plane.timeout());
        let registry = Arc::new(ConnectionRegistry::new(presence.clone(), notifier.clone()));

        Arc::new(Gateway {
            registry,
            correlator: Arc::new(RequestCorrelator::new()),
            auth: AuthValidator::new(credentials, settings.auth.lookup_timeout()),
            notifier,
            presence,
            snapshots: SnapshotUploader::new(
                objects,
                settings.object_store.placeholder_url.clone(),
                settings.object_store.timeout(),
            ),
            telemetry: self.telemetry.unwrap_or_else(|| Arc::new(TracingTelemetrySink)),
            tasks,
            snapshot_defaults: settings.snapshot.to_request(),
            liveness: LivenessConfig {
                scan_interval: settings.liveness.scan_interval(),
                timeout: settings.liveness.timeout(),
                pending_ttl: settings.correlator.pending_ttl(),
            },
            outbound_buffer: settings.server.outbound_buffer.max(1),
            max_message_size: settings.server.max_message_size,
        })
    }
}
