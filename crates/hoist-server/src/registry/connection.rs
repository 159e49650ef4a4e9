//! Handle to one live device connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use hoist_core::{ConnectionId, DeliveryError, OutboundFrame};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::warn;

/// A connected device as seen by the registry.
///
/// Owns the sending half of the connection's outbound queue. The socket
/// itself lives in the session task, which watches [`closed`](Self::closed)
/// and shuts the socket down once the handle is closed.
pub struct DeviceConnection {
    device_id: String,
    conn_id: ConnectionId,
    /// Send channel to the connection's write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    last_active: Mutex<Instant>,
    close_requested: AtomicBool,
    shutdown: CancellationToken,
    /// Count of frames refused because the queue was full.
    dropped_frames: AtomicU64,
}

impl DeviceConnection {
    /// Create a handle for an authenticated device.
    pub fn new(device_id: impl Into<String>, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            device_id: device_id.into(),
            conn_id: ConnectionId::new(),
            tx,
            connected_at: now,
            last_active: Mutex::new(now),
            close_requested: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Authenticated device id.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Identity of this particular connection.
    pub fn conn_id(&self) -> &ConnectionId {
        &self.conn_id
    }

    /// Queue a frame for the device.
    pub fn send(&self, frame: &OutboundFrame) -> Result<(), DeliveryError> {
        let json = frame.to_json().map_err(|e| {
            warn!(device_id = %self.device_id, error = %e, "failed to serialize outbound frame");
            DeliveryError::Closed(self.device_id.clone())
        })?;
        self.send_text(Arc::new(json))
    }

    /// Queue pre-serialized text for the device.
    pub fn send_text(&self, text: Arc<String>) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed(self.device_id.clone()));
        }
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                DeliveryError::QueueFull(self.device_id.clone())
            }
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed(self.device_id.clone()),
        })
    }

    /// Record activity now.
    pub fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    /// Last recorded activity.
    pub fn last_active(&self) -> Instant {
        *self.last_active.lock()
    }

    /// Time since the last activity, measured at `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_active())
    }

    /// Close the handle.
    ///
    /// Returns `true` for the call that actually closed it; later calls are
    /// no-ops returning `false`.
    pub fn close(&self) -> bool {
        if self.close_requested.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.cancel();
        true
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    /// Resolves once the handle is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }

    /// Total frames refused because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("device_id", &self.device_id)
            .field("conn_id", &self.conn_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn make_connection(capacity: usize) -> (DeviceConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (DeviceConnection::new("E1", tx), rx)
    }

    #[tokio::test]
    async fn send_serializes_frame() {
        let (conn, mut rx) = make_connection(8);
        conn.send(&OutboundFrame::Pong).unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, r#"{"type":"pong"}"#);
    }

    #[test]
    fn send_to_full_queue_is_queue_full() {
        let (conn, _rx) = make_connection(1);
        conn.send(&OutboundFrame::Pong).unwrap();
        let err = conn.send(&OutboundFrame::Pong).unwrap_err();
        assert_eq!(err, DeliveryError::QueueFull("E1".into()));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn send_to_dropped_receiver_is_closed() {
        let (conn, rx) = make_connection(8);
        drop(rx);
        assert_matches!(conn.send(&OutboundFrame::Pong), Err(DeliveryError::Closed(_)));
    }

    #[test]
    fn send_after_close_is_refused() {
        let (conn, _rx) = make_connection(8);
        assert!(conn.close());
        assert_matches!(conn.send(&OutboundFrame::Pong), Err(DeliveryError::Closed(_)));
    }

    #[test]
    fn close_happens_once() {
        let (conn, _rx) = make_connection(8);
        assert!(!conn.is_closed());
        assert!(conn.close());
        assert!(!conn.close());
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn closed_future_resolves_after_close() {
        let (conn, _rx) = make_connection(8);
        let conn = Arc::new(conn);
        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.closed().await })
        };
        let _ = conn.close();
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn touch_resets_idle_time() {
        let (conn, _rx) = make_connection(8);
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(conn.idle_for(Instant::now()), Duration::from_secs(20));

        conn.touch();
        assert_eq!(conn.idle_for(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn connection_ids_are_unique() {
        let (a, _ra) = make_connection(1);
        let (b, _rb) = make_connection(1);
        assert_ne!(a.conn_id(), b.conn_id());
        assert_eq!(a.device_id(), "E1");
    }
}
