//! Device identity: a random id generated once per install.

use crate::database::{keys, load_json, store_json, LocalStore};
use crate::platform::get_platform;
use crate::sync::models::DeviceRow;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Persists this install's device id in the local store.
pub struct DeviceRegistry {
    store: Arc<dyn LocalStore>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Return the device id, generating and persisting a UUID v4 the first
    /// time. A stored value that is not a valid UUID is replaced.
    pub async fn get_or_create(&self) -> Result<String> {
        if let Some(existing) = load_json::<String>(self.store.as_ref(), keys::DEVICE_ID)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Ignoring unreadable device id");
                None
            })
        {
            if Uuid::parse_str(&existing).is_ok() {
                return Ok(existing);
            }
            warn!(device_id = %existing, "Replacing malformed device id");
        }

        let device_id = Uuid::new_v4().to_string();
        store_json(self.store.as_ref(), keys::DEVICE_ID, &device_id).await?;
        info!(device_id = %device_id, "Generated device id");
        Ok(device_id)
    }

    /// The `devices` row registering this install for `user_id`.
    pub async fn device_row(&self, user_id: &str) -> Result<DeviceRow> {
        Ok(DeviceRow {
            id: self.get_or_create().await?,
            user_id: user_id.to_string(),
            platform: get_platform().to_string(),
            last_seen_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use serde_json::Value;

    #[tokio::test]
    async fn device_id_is_stable() {
        let store = Arc::new(MemoryStore::new());
        let registry = DeviceRegistry::new(store.clone());

        let first = registry.get_or_create().await.unwrap();
        let second = registry.get_or_create().await.unwrap();
        assert_eq!(first, second);

        // A new registry over the same store sees the same id
        let again = DeviceRegistry::new(store).get_or_create().await.unwrap();
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn malformed_id_is_replaced() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(keys::DEVICE_ID, Value::from("not-a-uuid"))
            .await
            .unwrap();

        let id = DeviceRegistry::new(store).get_or_create().await.unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn device_row_carries_user_and_platform() {
        let registry = DeviceRegistry::new(Arc::new(MemoryStore::new()));
        let row = registry.device_row("user-1").await.unwrap();
        assert_eq!(row.user_id, "user-1");
        assert_eq!(row.platform, get_platform());
        assert_eq!(row.id, registry.get_or_create().await.unwrap());
    }
}
