//! Best-effort delivery of gateway events to the control plane.

use std::sync::Arc;
use std::time::Duration;

use hoist_core::{ControlPlaneEvent, PresenceEvent, PresenceStatus, StoreError};
use metrics::counter;
use tracing::{debug, warn};

use crate::metrics::NOTIFICATIONS_TOTAL;
use crate::stores::ControlPlane;
use crate::tasks::TaskQueue;

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The control plane accepted the event.
    Delivered,
    /// The control plane failed or rejected it.
    Failed,
    /// The call exceeded its bound.
    TimedOut,
}

impl DeliveryOutcome {
    fn label(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::TimedOut => "timeout",
        }
    }
}

/// Sends events to the control plane without blocking the caller.
///
/// No retries and no ordering across events: two notifications for the
/// same device may reach the control plane in either order.
#[derive(Clone)]
pub struct NotificationDispatcher {
    control_plane: Arc<dyn ControlPlane>,
    tasks: TaskQueue,
    timeout: Duration,
}

impl NotificationDispatcher {
    /// Deliver through `control_plane`, queueing on `tasks`, each call bounded by `timeout`.
    pub fn new(control_plane: Arc<dyn ControlPlane>, tasks: TaskQueue, timeout: Duration) -> Self {
        Self {
            control_plane,
            tasks,
            timeout,
        }
    }

    /// Queue `event` for delivery. Returns `false` when the queue refused it.
    pub fn dispatch(&self, event: ControlPlaneEvent) -> bool {
        let this = self.clone();
        let accepted = self.tasks.submit("notify", async move {
            let _ = this.deliver(&event).await;
        });
        if !accepted {
            counter!(NOTIFICATIONS_TOTAL, "outcome" => "rejected").increment(1);
        }
        accepted
    }

    /// Queue an online/offline transition stamped with the current time.
    pub fn presence(&self, device_id: &str, status: PresenceStatus) -> bool {
        self.dispatch(ControlPlaneEvent::Presence(PresenceEvent::now(device_id, status)))
    }

    /// Deliver `event` now, within the bound. Failures are logged, never returned.
    pub async fn deliver(&self, event: &ControlPlaneEvent) -> DeliveryOutcome {
        let outcome = match tokio::time::timeout(self.timeout, self.control_plane.deliver(event)).await {
            Ok(Ok(())) => {
                debug!(kind = event.kind(), device_id = event.device_id(), "control plane notified");
                DeliveryOutcome::Delivered
            }
            Ok(Err(e)) => {
                warn!(kind = event.kind(), device_id = event.device_id(), error = %e, "control plane notification failed");
                DeliveryOutcome::Failed
            }
            Err(_) => {
                let e = StoreError::Timeout {
                    store: "control plane",
                    timeout: self.timeout,
                };
                warn!(kind = event.kind(), device_id = event.device_id(), error = %e, "control plane notification failed");
                DeliveryOutcome::TimedOut
            }
        };
        counter!(NOTIFICATIONS_TOTAL, "outcome" => outcome.label()).increment(1);
        outcome
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording control plane shared by unit tests.

    use async_trait::async_trait;
    use hoist_core::{ControlPlaneEvent, StoreError};
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use crate::stores::ControlPlane;

    /// Records every delivered event.
    #[derive(Default)]
    pub struct RecordingControlPlane {
        events: Mutex<Vec<ControlPlaneEvent>>,
        notify: Notify,
    }

    impl RecordingControlPlane {
        /// Snapshot of events delivered so far.
        pub fn events(&self) -> Vec<ControlPlaneEvent> {
            self.events.lock().clone()
        }

        /// Wait until at least `n` events have arrived.
        pub async fn wait_for(&self, n: usize) -> Vec<ControlPlaneEvent> {
            loop {
                let notified = self.notify.notified();
                {
                    let events = self.events.lock();
                    if events.len() >= n {
                        return events.clone();
                    }
                }
                notified.await;
            }
        }
    }

    #[async_trait]
    impl ControlPlane for RecordingControlPlane {
        async fn deliver(&self, event: &ControlPlaneEvent) -> Result<(), StoreError> {
            self.events.lock().push(event.clone());
            self.notify.notify_waiters();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingControlPlane;
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;

    struct SlowControlPlane;

    #[async_trait]
    impl ControlPlane for SlowControlPlane {
        async fn deliver(&self, _: &ControlPlaneEvent) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    struct FailingControlPlane;

    #[async_trait]
    impl ControlPlane for FailingControlPlane {
        async fn deliver(&self, _: &ControlPlaneEvent) -> Result<(), StoreError> {
            Err(StoreError::Status {
                store: "control plane",
                status: 502,
            })
        }
    }

    #[tokio::test]
    async fn presence_is_delivered_in_background() {
        let cp = Arc::new(RecordingControlPlane::default());
        let dispatcher = NotificationDispatcher::new(cp.clone(), TaskQueue::start(2, 16), Duration::from_secs(5));

        assert!(dispatcher.presence("E1", PresenceStatus::Online));

        let events = cp.wait_for(1).await;
        assert_matches!(
            &events[0],
            ControlPlaneEvent::Presence(PresenceEvent { device_id, status: PresenceStatus::Online, .. })
                if device_id == "E1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_control_plane_times_out() {
        let dispatcher = NotificationDispatcher::new(
            Arc::new(SlowControlPlane),
            TaskQueue::start(1, 4),
            Duration::from_millis(100),
        );
        let event = ControlPlaneEvent::Presence(PresenceEvent::now("E1", PresenceStatus::Offline));
        assert_eq!(dispatcher.deliver(&event).await, DeliveryOutcome::TimedOut);
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let dispatcher = NotificationDispatcher::new(
            Arc::new(FailingControlPlane),
            TaskQueue::start(1, 4),
            Duration::from_secs(1),
        );
        let event = ControlPlaneEvent::Presence(PresenceEvent::now("E1", PresenceStatus::Offline));
        assert_eq!(dispatcher.deliver(&event).await, DeliveryOutcome::Failed);
    }

    #[tokio::test]
    async fn dispatch_after_queue_shutdown_is_refused() {
        let tasks = TaskQueue::start(1, 4);
        let dispatcher = NotificationDispatcher::new(
            Arc::new(RecordingControlPlane::default()),
            tasks.clone(),
            Duration::from_secs(1),
        );
        tasks.shutdown(Duration::from_secs(1)).await;
        assert!(!dispatcher.presence("E1", PresenceStatus::Online));
    }
}
