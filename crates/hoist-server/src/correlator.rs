//! Matching asynchronous device responses to the requests that caused them.

use std::collections::HashMap;
use std::time::Duration;

use hoist_core::RequestId;
use metrics::gauge;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics::PENDING_REQUESTS;

#[allow(clippy::cast_precision_loss)]
fn record_pending(len: usize) {
    gauge!(PENDING_REQUESTS).set(len as f64);
}

/// What was asked of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// A `snapshot_request`; answered by `snapshot_response`.
    Snapshot,
    /// A `command`; answered by `command_response`.
    Command,
}

impl RequestKind {
    /// Label used for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Command => "command",
        }
    }
}

/// An outstanding device-directed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Correlation id sent to the device.
    pub request_id: RequestId,
    /// Device the request was sent to.
    pub device_id: String,
    /// What was asked.
    pub kind: RequestKind,
    /// When the request was created.
    pub created_at: Instant,
}

/// Table of outstanding requests keyed by request id.
///
/// Each request is consumed at most once. Unknown, duplicate, and
/// mismatched responses are dropped without error.
#[derive(Debug, Default)]
pub struct RequestCorrelator {
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
}

impl RequestCorrelator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh request id for `device_id` and record it as pending.
    pub fn create(&self, device_id: &str, kind: RequestKind) -> RequestId {
        let mut pending = self.pending.lock();
        let mut request_id = RequestId::new();
        while pending.contains_key(&request_id) {
            request_id = RequestId::new();
        }
        let _ = pending.insert(
            request_id.clone(),
            PendingRequest {
                request_id: request_id.clone(),
                device_id: device_id.to_owned(),
                kind,
                created_at: Instant::now(),
            },
        );
        record_pending(pending.len());
        debug!(device_id, req_id = %request_id, kind = kind.as_str(), "request pending");
        request_id
    }

    /// Consume the pending request `request_id` if it was issued to
    /// `device_id` with the same `kind`.
    ///
    /// A response from another device, or of the wrong kind, leaves the
    /// request pending.
    pub fn resolve(&self, request_id: &str, device_id: &str, kind: RequestKind) -> Option<PendingRequest> {
        let mut pending = self.pending.lock();
        let Some(entry) = pending.get(request_id) else {
            debug!(device_id, req_id = request_id, "response for unknown request, dropping");
            return None;
        };
        if entry.device_id != device_id || entry.kind != kind {
            warn!(
                device_id,
                req_id = request_id,
                expected_device = %entry.device_id,
                expected_kind = entry.kind.as_str(),
                kind = kind.as_str(),
                "response does not match pending request, dropping"
            );
            return None;
        }
        let resolved = pending.remove(request_id);
        record_pending(pending.len());
        resolved
    }

    /// Forget a request that never reached the device.
    pub fn cancel(&self, request_id: &RequestId) -> Option<PendingRequest> {
        let mut pending = self.pending.lock();
        let removed = pending.remove(request_id);
        record_pending(pending.len());
        removed
    }

    /// Drop requests older than `ttl` as of `now`; returns what was dropped.
    pub fn expire(&self, ttl: Duration, now: Instant) -> Vec<PendingRequest> {
        let mut pending = self.pending.lock();
        let stale: Vec<RequestId> = pending
            .values()
            .filter(|p| now.saturating_duration_since(p.created_at) > ttl)
            .map(|p| p.request_id.clone())
            .collect();
        let expired: Vec<PendingRequest> = stale.iter().filter_map(|id| pending.remove(id)).collect();
        record_pending(pending.len());
        drop(pending);

        for request in &expired {
            debug!(
                device_id = %request.device_id,
                req_id = %request.request_id,
                kind = request.kind.as_str(),
                "pending request expired"
            );
        }
        expired
    }

    /// Outstanding request count.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
