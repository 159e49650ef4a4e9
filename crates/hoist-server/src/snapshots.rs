//! Snapshot upload pipeline.
//!
//! A correlated `snapshot_response` is decoded, stored, and reported to the
//! control plane. An upload that fails (or has nowhere to go) is reported
//! with the placeholder URL instead; the pipeline never stops early for it.

use std::sync::Arc;
use std::time::Duration;

use hoist_core::constants::SNAPSHOT_KEY_PREFIX;
use hoist_core::frames::SnapshotPayload;
use hoist_core::{ControlPlaneEvent, SnapshotEvent, StoreError};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::metrics::SNAPSHOT_UPLOADS_TOTAL;
use crate::notify::NotificationDispatcher;
use crate::stores::ObjectStore;

/// Object key for a snapshot: `snapshots/<device>/<ts>_<req>.<ext>`.
pub fn object_key(device_id: &str, ts: i64, req_id: &str, ext: &str) -> String {
    format!("{SNAPSHOT_KEY_PREFIX}/{device_id}/{ts}_{req_id}.{ext}")
}

/// Device timestamp if usable, otherwise the gateway's receive time (unix ms).
pub fn effective_ts(device_ts: Option<i64>) -> i64 {
    device_ts
        .filter(|ts| *ts > 0)
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis())
}

/// A snapshot response ready for upload.
#[derive(Debug, Clone)]
pub struct SnapshotJob {
    /// Authenticated device that produced it.
    pub device_id: String,
    /// Request it answers.
    pub req_id: String,
    /// Timestamp used in the object key.
    pub ts: i64,
    /// Decoded response payload.
    pub payload: SnapshotPayload,
}

/// Stores snapshots and reports them.
#[derive(Clone)]
pub struct SnapshotUploader {
    store: Option<Arc<dyn ObjectStore>>,
    placeholder_url: String,
    timeout: Duration,
}

impl SnapshotUploader {
    /// Upload to `store` (or skip uploads when `None`).
    pub fn new(store: Option<Arc<dyn ObjectStore>>, placeholder_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            placeholder_url: placeholder_url.into(),
            timeout,
        }
    }

    /// Reference reported when no real URL is available.
    pub fn placeholder_url(&self) -> &str {
        &self.placeholder_url
    }

    /// Store `bytes` under `key`; returns the stored URL or the placeholder.
    pub async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> String {
        let Some(store) = &self.store else {
            debug!(key, "no object store configured, using placeholder");
            counter!(SNAPSHOT_UPLOADS_TOTAL, "outcome" => "skipped").increment(1);
            return self.placeholder_url.clone();
        };

        let result = match tokio::time::timeout(self.timeout, store.put(key, bytes, content_type)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                store: "object store",
                timeout: self.timeout,
            }),
        };
        match result {
            Ok(url) => {
                info!(key, url = %url, "snapshot stored");
                counter!(SNAPSHOT_UPLOADS_TOTAL, "outcome" => "stored").increment(1);
                url
            }
            Err(e) => {
                warn!(key, error = %e, "snapshot upload failed, using placeholder");
                counter!(SNAPSHOT_UPLOADS_TOTAL, "outcome" => "failed").increment(1);
                self.placeholder_url.clone()
            }
        }
    }

    /// Decode, store, and report one snapshot.
    ///
    /// Returns the reported URL, or `None` when the image data could not be
    /// decoded (nothing is reported then).
    pub async fn process(&self, job: SnapshotJob, notifier: &NotificationDispatcher) -> Option<String> {
        let bytes = match job.payload.decode_data() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(device_id = %job.device_id, req_id = %job.req_id, error = %e, "undecodable snapshot data");
                counter!(SNAPSHOT_UPLOADS_TOTAL, "outcome" => "invalid").increment(1);
                return None;
            }
        };

        let key = object_key(&job.device_id, job.ts, &job.req_id, job.payload.extension());
        let url = self.upload(&key, bytes, job.payload.content_type()).await;

        let event = ControlPlaneEvent::Snapshot(SnapshotEvent {
            device_id: job.device_id,
            req_id: job.req_id,
            snapshot_url: url.clone(),
        });
        let _ = notifier.deliver(&event).await;
        Some(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use hoist_core::constants::DEFAULT_PLACEHOLDER_URL;

    use crate::notify::testing::RecordingControlPlane;
    use crate::stores::MemoryObjectStore;
    use crate::tasks::TaskQueue;

    struct BrokenStore;

    #[async_trait]
    impl ObjectStore for BrokenStore {
        async fn put(&self, _: &str, _: Vec<u8>, _: &str) -> Result<String, StoreError> {
            Err(StoreError::Status {
                store: "object store",
                status: 500,
            })
        }
    }

    fn job(data: &str) -> SnapshotJob {
        SnapshotJob {
            device_id: "E1".into(),
            req_id: "R1".into(),
            ts: 1_700_000_000_000,
            payload: SnapshotPayload {
                format: "jpg".into(),
                quality: Some(80),
                resolution: Some("1920x1080".into()),
                data: data.into(),
            },
        }
    }

    fn notifier(cp: Arc<RecordingControlPlane>) -> NotificationDispatcher {
        NotificationDispatcher::new(cp, TaskQueue::start(1, 8), Duration::from_secs(5))
    }

    #[test]
    fn key_layout() {
        assert_eq!(
            object_key("E1", 1_700_000_000_000, "R1", "jpg"),
            "snapshots/E1/1700000000000_R1.jpg"
        );
    }

    #[test]
    fn missing_or_zero_ts_uses_receive_time() {
        assert_eq!(effective_ts(Some(42)), 42);
        let before = chrono::Utc::now().timestamp_millis();
        assert!(effective_ts(None) >= before);
        assert!(effective_ts(Some(0)) >= before);
    }

    #[tokio::test]
    async fn stores_and_reports_url() {
        let store = Arc::new(MemoryObjectStore::new());
        let uploader = SnapshotUploader::new(Some(store.clone()), DEFAULT_PLACEHOLDER_URL, Duration::from_secs(5));
        let cp = Arc::new(RecordingControlPlane::default());

        let url = uploader
            .process(job(&STANDARD.encode(b"\xff\xd8jpeg")), &notifier(cp.clone()))
            .await
            .unwrap();

        assert_eq!(url, "memory://snapshots/E1/1700000000000_R1.jpg");
        let stored = store.get("snapshots/E1/1700000000000_R1.jpg").unwrap();
        assert_eq!(stored.bytes, b"\xff\xd8jpeg".to_vec());
        assert_eq!(stored.content_type, "image/jpeg");

        let events = cp.events();
        assert_matches!(
            &events[..],
            [ControlPlaneEvent::Snapshot(SnapshotEvent { req_id, snapshot_url, .. })]
                if req_id == "R1" && snapshot_url == &url
        );
    }

    #[tokio::test]
    async fn failed_upload_reports_placeholder() {
        let uploader = SnapshotUploader::new(Some(Arc::new(BrokenStore)), DEFAULT_PLACEHOLDER_URL, Duration::from_secs(5));
        let cp = Arc::new(RecordingControlPlane::default());

        let url = uploader
            .process(job(&STANDARD.encode(b"img")), &notifier(cp.clone()))
            .await
            .unwrap();

        assert_eq!(url, DEFAULT_PLACEHOLDER_URL);
        assert_eq!(cp.events().len(), 1);
    }

    #[tokio::test]
    async fn no_store_reports_placeholder() {
        let uploader = SnapshotUploader::new(None, "https://example.com/none.jpg", Duration::from_secs(5));
        let url = uploader.upload("k", vec![1], "image/jpeg").await;
        assert_eq!(url, "https://example.com/none.jpg");
        assert_eq!(uploader.placeholder_url(), "https://example.com/none.jpg");
    }

    #[tokio::test]
    async fn undecodable_data_reports_nothing() {
        let uploader = SnapshotUploader::new(Some(Arc::new(MemoryObjectStore::new())), DEFAULT_PLACEHOLDER_URL, Duration::from_secs(5));
        let cp = Arc::new(RecordingControlPlane::default());

        assert!(uploader.process(job("!!not base64!!"), &notifier(cp.clone())).await.is_none());
        assert!(cp.events().is_empty());
    }
}
