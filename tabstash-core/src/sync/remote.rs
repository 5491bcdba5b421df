//! Remote record-store interface.
//!
//! The remote store is account-scoped and relational: two related tables
//! (`tab_groups`, `saved_tabs`) with upsert-by-id and delete-by-id, a
//! `devices` table, a `profiles` block flag, an `abuse_flags` audit table
//! and server-side functions reachable through [`RemoteStore::invoke`].

use crate::sync::models::{AbuseEventRow, DeviceRow, GroupRow, TabRow};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Substring the remote store uses to signal a tier capacity limit.
pub const CAPACITY_EXCEEDED_MARKER: &str = "tier_limit_exceeded";

/// An expected rejection from the remote store (network failure, non-2xx,
/// malformed response, trigger rejection).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("remote store error: {message}")]
pub struct RemoteError {
    /// HTTP status when one was received.
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Whether this is the non-retryable tier capacity rejection.
    pub fn is_capacity_exceeded(&self) -> bool {
        self.message
            .to_ascii_lowercase()
            .contains(CAPACITY_EXCEEDED_MARKER)
    }
}

/// Result type for remote store calls
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Client for the remote record store.
///
/// Upserts must be idempotent by id: the sync engine delivers at least
/// once, and a tab may be upserted both on its own and as part of a
/// replayed group.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Register (or refresh) this device. Idempotent.
    async fn upsert_device(&self, device: &DeviceRow) -> RemoteResult<()>;

    async fn upsert_group(&self, group: &GroupRow) -> RemoteResult<()>;

    async fn upsert_tab(&self, tab: &TabRow) -> RemoteResult<()>;

    async fn delete_group(&self, group_id: &str) -> RemoteResult<()>;

    async fn delete_tab(&self, tab_id: &str) -> RemoteResult<()>;

    /// All groups for a user with nested tabs, newest first.
    async fn fetch_groups(&self, user_id: &str) -> RemoteResult<Vec<GroupRow>>;

    /// Whether the user's profile carries the permanent block flag.
    async fn is_user_blocked(&self, user_id: &str) -> RemoteResult<bool>;

    /// Set the permanent block flag on the user's profile.
    async fn block_user(&self, user_id: &str) -> RemoteResult<()>;

    async fn insert_abuse_event(&self, event: &AbuseEventRow) -> RemoteResult<()>;

    /// Call a server-side function.
    async fn invoke(&self, function: &str, payload: Value) -> RemoteResult<Value>;
}

/// Stand-in used when no remote store is configured. Every call fails,
/// so pushes land in the retry queue until a remote is set up.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRemote;

impl OfflineRemote {
    fn unavailable<T>() -> RemoteResult<T> {
        Err(RemoteError::new("remote store is not configured"))
    }
}

#[async_trait]
impl RemoteStore for OfflineRemote {
    async fn upsert_device(&self, _device: &DeviceRow) -> RemoteResult<()> {
        Self::unavailable()
    }

    async fn upsert_group(&self, _group: &GroupRow) -> RemoteResult<()> {
        Self::unavailable()
    }

    async fn upsert_tab(&self, _tab: &TabRow) -> RemoteResult<()> {
        Self::unavailable()
    }

    async fn delete_group(&self, _group_id: &str) -> RemoteResult<()> {
        Self::unavailable()
    }

    async fn delete_tab(&self, _tab_id: &str) -> RemoteResult<()> {
        Self::unavailable()
    }

    async fn fetch_groups(&self, _user_id: &str) -> RemoteResult<Vec<GroupRow>> {
        Self::unavailable()
    }

    async fn is_user_blocked(&self, _user_id: &str) -> RemoteResult<bool> {
        Self::unavailable()
    }

    async fn block_user(&self, _user_id: &str) -> RemoteResult<()> {
        Self::unavailable()
    }

    async fn insert_abuse_event(&self, _event: &AbuseEventRow) -> RemoteResult<()> {
        Self::unavailable()
    }

    async fn invoke(&self, _function: &str, _payload: Value) -> RemoteResult<Value> {
        Self::unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_remote_rejects_without_capacity_marker() {
        let err = OfflineRemote.delete_tab("tab-1").await.unwrap_err();
        assert!(!err.is_capacity_exceeded());
        assert!(OfflineRemote.fetch_groups("user-1").await.is_err());
    }

    #[test]
    fn capacity_marker_matches_case_insensitively() {
        assert!(RemoteError::new("TIER_LIMIT_EXCEEDED: free plan allows 50 groups")
            .is_capacity_exceeded());
        assert!(RemoteError::with_status(400, "trigger raised tier_limit_exceeded")
            .is_capacity_exceeded());
        assert!(!RemoteError::new("connection reset").is_capacity_exceeded());
    }

    #[test]
    fn status_is_kept_separately_from_message() {
        let err = RemoteError::with_status(503, "unavailable");
        assert_eq!(err.status, Some(503));
        assert_eq!(err.to_string(), "remote store error: unavailable");
        assert_eq!(RemoteError::new("timeout").status, None);
    }
}
