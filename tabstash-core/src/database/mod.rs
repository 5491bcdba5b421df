//! Local persistence layer.
//!
//! Everything the device keeps (tab groups, settings, the retry queue, the
//! cached encryption key, throttle windows) goes through the [`LocalStore`]
//! trait: a flat, namespaced key-value map of JSON values with no
//! transactional guarantees. Callers do full get-then-set read-modify-write.

pub mod memory;
pub mod models;
pub mod records;
pub mod schema;

pub use memory::MemoryStore;
pub use models::{SavedTab, Settings, TabDraft, TabGroup};
pub use records::LocalRecordStore;
pub use schema::{Database, SqliteStore};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised by local storage backends
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: i32, found: i32 },

    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for local storage operations
pub type DbResult<T> = std::result::Result<T, DatabaseError>;

/// Namespaced keys used in the local store.
pub mod keys {
    pub const TAB_GROUPS: &str = "tab_groups";
    pub const SETTINGS: &str = "settings";
    pub const DEVICE_ID: &str = "device_id";
    pub const RETRY_QUEUE: &str = "retry_queue";

    /// Cached, exported encryption key for a user.
    pub fn encryption_key(user_id: &str) -> String {
        format!("encryption_key:{}", user_id)
    }

    /// Sliding window of recent save timestamps for a user.
    pub fn save_timestamps(user_id: &str) -> String {
        format!("save_timestamps:{}", user_id)
    }
}

/// Flat key-value persistence primitive.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read a value; `None` when the key was never set or was removed.
    async fn get(&self, key: &str) -> DbResult<Option<Value>>;

    /// Overwrite the value stored under `key`.
    async fn set(&self, key: &str, value: Value) -> DbResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> DbResult<()>;
}

/// Read and deserialize a typed value.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn LocalStore,
    key: &str,
) -> DbResult<Option<T>> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| DatabaseError::Serialization(format!("{}: {}", key, e))),
        None => Ok(None),
    }
}

/// Serialize and store a typed value.
pub async fn store_json<T: Serialize + ?Sized>(
    store: &dyn LocalStore,
    key: &str,
    value: &T,
) -> DbResult<()> {
    let value = serde_json::to_value(value)
        .map_err(|e| DatabaseError::Serialization(format!("{}: {}", key, e)))?;
    store.set(key, value).await
}
