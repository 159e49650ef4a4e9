//! Device credential lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use hoist_core::StoreError;

/// Read-only source of device tokens.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Token registered for `device_id`, or `None` for an unknown device.
    async fn token_for(&self, device_id: &str) -> Result<Option<String>, StoreError>;
}

/// Credentials held in memory, loaded from settings.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialStore {
    tokens: HashMap<String, String>,
}

impl StaticCredentialStore {
    /// Build from a device id → token table.
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no device is known.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for StaticCredentialStore
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn token_for(&self, device_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.tokens.get(device_id).cloned())
    }
}
