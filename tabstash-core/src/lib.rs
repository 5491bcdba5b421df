//! TabStash Core Library
//!
//! Local-first storage of browser tab groups with optional end-to-end
//! encrypted replication to a remote account-scoped store: per-user key
//! derivation, field-level encryption, push/pull of groups and tabs, a
//! durable retry queue, and a save-abuse throttle.

pub mod crypto;
pub mod database;
pub mod platform;
pub mod stash;
pub mod sync;
pub mod throttle;

#[cfg(test)]
pub(crate) mod testing;

pub use crypto::{
    decrypt_field, encrypt_field, CryptoError, CryptoResult, EncryptionKey, KeyManager,
};
pub use database::{
    DatabaseError, LocalRecordStore, LocalStore, MemoryStore, SavedTab, Settings, SqliteStore,
    TabDraft, TabGroup,
};
pub use platform::{
    ensure_data_dir, get_config_dir, get_config_path, get_data_dir, get_default_store_path,
    get_platform,
};
pub use stash::{LoadGuard, LoadResult, SaveReport, SaveSync, TabStash};
pub use sync::{
    FlushReport, PushOutcome, RemoteError, RemoteStore, Session, SessionProvider, StaticSession,
    SyncConfig, SyncEngine, SyncStatus,
};
pub use throttle::{SaveThrottle, ThrottleConfig, ThrottleDecision};

use thiserror::Error;

/// Result type for TabStash operations
pub type Result<T> = std::result::Result<T, TabStashError>;

/// General error type for TabStash operations
#[derive(Error, Debug)]
pub enum TabStashError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Database error: {0}")]
    Database(#[from] database::DatabaseError),

    #[error("{0}")]
    Remote(#[from] sync::RemoteError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
