//! Sync data models: retry queue items, remote row shapes, pulled snapshots.
//!
//! Remote rows are untyped maps on the wire; each row shape gets a serde
//! struct here and is converted to or from the domain model only in
//! [`crate::sync::crypto`].

use crate::database::{SavedTab, TabGroup};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote mutation recorded in the retry queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOperation {
    Create,
    Update,
    Delete,
}

/// Kind of record a queue item refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[serde(rename = "tab_group")]
    Group,
    #[serde(rename = "saved_tab")]
    Tab,
}

/// A tab plus the id of the group it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub group_id: String,
    pub tab: SavedTab,
}

/// Last-known plaintext snapshot carried by a queue item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum QueuePayload {
    Group(TabGroup),
    Tab(TabSnapshot),
    Empty,
}

/// A failed remote mutation awaiting replay.
///
/// The payload is always plaintext; encryption happens only at the remote
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryQueueItem {
    pub id: String,
    pub operation: QueueOperation,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub payload: QueuePayload,
    pub created_at: DateTime<Utc>,
    pub retries: u32,
}

/// Input to [`crate::sync::queue::RetryQueue::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQueueItem {
    pub operation: QueueOperation,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub payload: QueuePayload,
}

impl NewQueueItem {
    /// Whole-group create (group row plus all of its tabs).
    pub fn group_create(group: &TabGroup) -> Self {
        Self {
            operation: QueueOperation::Create,
            entity_type: EntityType::Group,
            entity_id: group.id.clone(),
            payload: QueuePayload::Group(group.clone()),
        }
    }

    /// Single-tab create.
    pub fn tab_create(group_id: &str, tab: &SavedTab) -> Self {
        Self {
            operation: QueueOperation::Create,
            entity_type: EntityType::Tab,
            entity_id: tab.id.clone(),
            payload: QueuePayload::Tab(TabSnapshot {
                group_id: group_id.to_string(),
                tab: tab.clone(),
            }),
        }
    }

    pub fn delete(entity_type: EntityType, entity_id: &str) -> Self {
        Self {
            operation: QueueOperation::Delete,
            entity_type,
            entity_id: entity_id.to_string(),
            payload: QueuePayload::Empty,
        }
    }
}

/// Coarse sync health shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    Pending,
    Failed,
}

impl SyncStatus {
    /// Convert sync status to its string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `tab_groups` row. `name` holds ciphertext on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRow {
    pub id: String,
    pub user_id: String,
    pub device_id: String,
    pub name: String,
    pub is_auto_save: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Nested tabs; only present on reads.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub saved_tabs: Vec<TabRow>,
}

/// `saved_tabs` row. `url`, `title` and `favicon_url` hold ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabRow {
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub url: String,
    pub title: String,
    pub favicon_url: Option<String>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// `devices` row; records reference it by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRow {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub last_seen_at: DateTime<Utc>,
}

/// Severity recorded by the save throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbuseAction {
    Flagged,
    Blocked,
}

/// `abuse_flags` audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbuseEventRow {
    pub user_id: String,
    pub device_id: String,
    pub action: AbuseAction,
    pub save_count: u32,
    pub window_seconds: i64,
    pub created_at: DateTime<Utc>,
}

/// A tab decrypted from the remote snapshot. Fields that failed to decrypt
/// are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledTab {
    pub id: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub favicon_url: Option<String>,
    /// Set when a stored favicon failed to decrypt, as opposed to none stored.
    pub favicon_unreadable: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// A group decrypted from the remote snapshot. `name` is `None` when it
/// failed to decrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledGroup {
    pub id: String,
    pub name: Option<String>,
    pub tabs: Vec<PulledTab>,
    pub is_auto_save: bool,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PulledGroup {
    /// Materialise for the local store. A missing name becomes empty, a
    /// missing title falls back to the URL, and tabs without a URL are
    /// skipped. Records with substituted values are marked `partial`.
    pub fn into_group(self) -> TabGroup {
        let tabs = self
            .tabs
            .into_iter()
            .filter_map(|tab| {
                let url = tab.url?;
                Some(SavedTab {
                    id: tab.id,
                    partial: tab.title.is_none() || tab.favicon_unreadable,
                    title: tab.title.unwrap_or_else(|| url.clone()),
                    url,
                    favicon_url: tab.favicon_url,
                    position: tab.position,
                    created_at: tab.created_at,
                })
            })
            .collect();

        TabGroup {
            id: self.id,
            partial: self.name.is_none(),
            name: self.name.unwrap_or_default(),
            tabs,
            is_auto_save: self.is_auto_save,
            device_id: self.device_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
