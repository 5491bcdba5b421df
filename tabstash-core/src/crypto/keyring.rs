//! Per-user key management.
//!
//! One key per authenticated user, derived from the configured secret and
//! cached (exported) in the local store so later sessions skip derivation:
//!
//! secret + user id → HKDF-SHA256 → EncryptionKey → base64 → `encryption_key:{user_id}`

use crate::crypto::{cipher::EncryptionKey, kdf::derive_user_key};
use crate::database::{keys, load_json, store_json, LocalStore};
use crate::{Result, TabStashError};
use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Derives and caches the field encryption key for each user.
pub struct KeyManager {
    store: Arc<dyn LocalStore>,
    secret: Option<Zeroizing<String>>,
}

impl KeyManager {
    /// Create a key manager. `secret` may be absent; a cache miss then
    /// fails with a configuration error.
    pub fn new(store: Arc<dyn LocalStore>, secret: Option<String>) -> Self {
        Self {
            store,
            secret: secret.filter(|s| !s.is_empty()).map(Zeroizing::new),
        }
    }

    /// Whether a derivation secret is configured.
    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Return the user's key, deriving and caching it on first use.
    pub async fn get_or_derive_key(&self, user_id: &str) -> Result<EncryptionKey> {
        let cache_key = keys::encryption_key(user_id);

        match load_json::<String>(self.store.as_ref(), &cache_key).await {
            Ok(Some(exported)) => match EncryptionKey::import(&exported) {
                Ok(key) => return Ok(key),
                Err(e) => {
                    warn!(user_id, error = %e, "Discarding corrupt cached encryption key");
                    self.store.remove(&cache_key).await?;
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!(user_id, error = %e, "Discarding unreadable cached encryption key");
                self.store.remove(&cache_key).await?;
            }
        }

        let secret = self.secret.as_ref().ok_or_else(|| {
            TabStashError::Config("encryption secret is not configured".to_string())
        })?;

        let key = derive_user_key(secret.as_bytes(), user_id)?;
        let exported = Zeroizing::new(key.export());
        store_json(self.store.as_ref(), &cache_key, exported.as_str()).await?;
        debug!(user_id, "Derived and cached encryption key");

        Ok(key)
    }

    /// Remove the cached key (sign-out).
    pub async fn clear_cached_key(&self, user_id: &str) -> Result<()> {
        self.store.remove(&keys::encryption_key(user_id)).await?;
        Ok(())
    }
}
