//! Device admission.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::stores::CredentialStore;

// ── Types ────────────────────────────────────────────────────────────────────

/// Outcome of a credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// The device may connect.
    Accepted,
    /// The device is refused.
    Rejected(RejectReason),
}

impl AuthDecision {
    /// Whether the device may connect.
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Why a device was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No device id supplied.
    MissingDeviceId,
    /// No token supplied.
    MissingToken,
    /// The credential source does not know the device.
    UnknownDevice,
    /// The token does not match.
    TokenMismatch,
    /// The credential source failed or timed out.
    StoreUnavailable,
}

impl RejectReason {
    /// Label used for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingDeviceId => "missing_device_id",
            Self::MissingToken => "missing_token",
            Self::UnknownDevice => "unknown_device",
            Self::TokenMismatch => "token_mismatch",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

// ── Validator ────────────────────────────────────────────────────────────────

/// Checks a device's claimed identity before any session is allocated.
///
/// Fails closed: missing input, an unknown device, or an unreachable
/// credential source all reject.
#[derive(Clone)]
pub struct AuthValidator {
    store: Arc<dyn CredentialStore>,
    timeout: Duration,
}

impl AuthValidator {
    /// Check against `store`, waiting at most `timeout` per lookup.
    pub fn new(store: Arc<dyn CredentialStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Check `token` for `device_id`.
    pub async fn check(&self, device_id: &str, token: &str) -> AuthDecision {
        let decision = self.decide(device_id, token).await;
        match decision {
            AuthDecision::Accepted => debug!(device_id, "device authenticated"),
            AuthDecision::Rejected(reason) => {
                warn!(device_id, reason = reason.as_str(), "device rejected");
            }
        }
        decision
    }

    async fn decide(&self, device_id: &str, token: &str) -> AuthDecision {
        if device_id.is_empty() {
            return AuthDecision::Rejected(RejectReason::MissingDeviceId);
        }
        if token.is_empty() {
            return AuthDecision::Rejected(RejectReason::MissingToken);
        }

        let expected = match tokio::time::timeout(self.timeout, self.store.token_for(device_id)).await {
            Ok(Ok(Some(expected))) => expected,
            Ok(Ok(None)) => return AuthDecision::Rejected(RejectReason::UnknownDevice),
            Ok(Err(e)) => {
                warn!(device_id, error = %e, "credential lookup failed");
                return AuthDecision::Rejected(RejectReason::StoreUnavailable);
            }
            Err(_) => {
                warn!(device_id, timeout = ?self.timeout, "credential lookup timed out");
                return AuthDecision::Rejected(RejectReason::StoreUnavailable);
            }
        };

        if safe_equal(&expected, token) {
            AuthDecision::Accepted
        } else {
            AuthDecision::Rejected(RejectReason::TokenMismatch)
        }
    }
}
