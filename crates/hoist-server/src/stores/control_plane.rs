//! Control-plane webhook client.

use std::time::Duration;

use async_trait::async_trait;
use hoist_core::{ControlPlaneEvent, StoreError};
use tracing::info;

const STORE: &str = "control plane";

/// Receiver of gateway state changes and device results.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Deliver one event. Callers bound the call and never retry.
    async fn deliver(&self, event: &ControlPlaneEvent) -> Result<(), StoreError>;
}

/// Callback path for each event kind, relative to the control-plane base URL.
pub fn callback_path(event: &ControlPlaneEvent) -> &'static str {
    match event {
        ControlPlaneEvent::Presence(_) => "/api/v1/devices/status/callback",
        ControlPlaneEvent::Snapshot(_) => "/api/v1/devices/snapshot/callback",
        ControlPlaneEvent::CommandResult(_) => "/api/v1/devices/command/callback",
    }
}

/// Control plane reached over HTTP JSON callbacks.
pub struct HttpControlPlane {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpControlPlane {
    /// Post callbacks under `base_url`.
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn deliver(&self, event: &ControlPlaneEvent) -> Result<(), StoreError> {
        let url = format!("{}{}", self.base_url, callback_path(event));
        let request = self.client.post(&url).timeout(self.timeout);
        let request = match event {
            ControlPlaneEvent::Presence(e) => request.json(e),
            ControlPlaneEvent::Snapshot(e) => request.json(e),
            ControlPlaneEvent::CommandResult(e) => request.json(e),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout {
                    store: STORE,
                    timeout: self.timeout,
                }
            } else {
                StoreError::unavailable(STORE, e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(StoreError::Status {
                store: STORE,
                status: status.as_u16(),
            })
        }
    }
}

/// Control plane stand-in that only logs events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogControlPlane;

#[async_trait]
impl ControlPlane for LogControlPlane {
    async fn deliver(&self, event: &ControlPlaneEvent) -> Result<(), StoreError> {
        info!(
            kind = event.kind(),
            device_id = event.device_id(),
            ?event,
            "control plane event (no control plane configured)"
        );
        Ok(())
    }
}
