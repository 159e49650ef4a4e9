//! Binary object storage for uploaded snapshots.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use hoist_core::StoreError;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;

const STORE: &str = "object store";

/// Destination for device-produced binaries.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`; returns the object's public URL.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StoreError>;
}

/// Object store reached over HTTP `PUT {base_url}/{key}`.
///
/// Works with any endpoint accepting plain PUT uploads (pre-authorised
/// bucket gateways, MinIO behind a signing proxy, WebDAV).
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    public_url: String,
    timeout: Duration,
}

impl HttpObjectStore {
    /// Upload to `base_url`; report objects under `public_url` (defaults to `base_url`).
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        public_url: Option<&str>,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_owned();
        let public_url = public_url.map_or_else(
            || base_url.clone(),
            |url| url.trim_end_matches('/').to_owned(),
        );
        Self {
            client,
            base_url,
            public_url,
            timeout,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StoreError> {
        let url = format!("{}/{key}", self.base_url);
        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
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
        if !status.is_success() {
            return Err(StoreError::Status {
                store: STORE,
                status: status.as_u16(),
            });
        }
        Ok(format!("{}/{key}", self.public_url))
    }
}

/// In-memory object store.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

/// An object held by [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// MIME type given at upload.
    pub content_type: String,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a stored object.
    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().get(key).cloned()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StoreError> {
        let object = StoredObject {
            bytes,
            content_type: content_type.to_owned(),
        };
        let _ = self.objects.lock().insert(key.to_owned(), object);
        Ok(format!("memory://{key}"))
    }
}
