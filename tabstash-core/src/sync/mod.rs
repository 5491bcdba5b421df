//! E2E encrypted sync for TabStash
//!
//! Replicates local tab groups to a remote account-scoped store:
//! - Field-level AES-256-GCM encryption under a per-user key
//! - Push with per-tab failure isolation and a durable retry queue
//! - Pull with per-field decryption recovery
//! - Sync health derived from queue size and consecutive failures

#[cfg(feature = "sync")]
pub mod client;
pub mod config;
pub mod crypto;
pub mod device;
pub mod engine;
pub mod models;
pub mod queue;
pub mod remote;
pub mod session;
pub mod status;

#[cfg(feature = "sync")]
pub use client::HttpRemoteStore;
pub use config::SyncConfig;
pub use device::DeviceRegistry;
pub use engine::{FlushReport, PushOutcome, SyncEngine};
pub use models::{
    EntityType, NewQueueItem, PulledGroup, PulledTab, QueueOperation, QueuePayload,
    RetryQueueItem, SyncStatus,
};
pub use queue::RetryQueue;
pub use remote::{OfflineRemote, RemoteError, RemoteResult, RemoteStore, CAPACITY_EXCEEDED_MARKER};
pub use session::{Session, SessionProvider, StaticSession};
pub use status::{derive_status, StatusInputs, SyncFailureState};
