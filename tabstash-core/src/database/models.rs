//! Local models for saved tab groups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single saved browser tab. Owned by its parent [`TabGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedTab {
    pub id: String,
    pub url: String,
    pub title: String,
    pub favicon_url: Option<String>,
    /// Display/restore order within the group. Contiguous from 0 on
    /// creation; gaps are allowed after deletions.
    pub position: i32,
    pub created_at: DateTime<Utc>,
    /// Title or favicon failed to decrypt on the last pull. The remote row
    /// keeps the original values and is not overwritten from this copy.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

/// Tab data captured from the browser before it becomes a [`SavedTab`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabDraft {
    pub url: String,
    pub title: String,
    pub favicon_url: Option<String>,
}

impl TabDraft {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            favicon_url: None,
        }
    }

    pub fn with_favicon(mut self, favicon_url: impl Into<String>) -> Self {
        self.favicon_url = Some(favicon_url.into());
        self
    }
}

/// A named group of saved tabs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroup {
    pub id: String,
    pub name: String,
    pub tabs: Vec<SavedTab>,
    /// Set for groups created by the automatic-save path. Cleared on rename
    /// and never set again.
    pub is_auto_save: bool,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Name failed to decrypt on the last pull. The remote group row is not
    /// overwritten until the user renames the group.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

impl TabGroup {
    /// Build a new group, assigning ids and contiguous positions from 0.
    pub fn new(
        name: impl Into<String>,
        drafts: Vec<TabDraft>,
        is_auto_save: bool,
        device_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let tabs = drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| SavedTab {
                id: Uuid::new_v4().to_string(),
                url: draft.url,
                title: draft.title,
                favicon_url: draft.favicon_url,
                position: index as i32,
                created_at: now,
                partial: false,
            })
            .collect();

        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            tabs,
            is_auto_save,
            device_id: device_id.into(),
            created_at: now,
            updated_at: now,
            partial: false,
        }
    }

    /// Rename the group. A rename always demotes an auto-save group to a
    /// manual one.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.is_auto_save = false;
        self.partial = false;
        self.touch();
    }

    /// Append tabs after the current highest position.
    pub fn add_tabs(&mut self, drafts: Vec<TabDraft>) -> Vec<SavedTab> {
        let now = Utc::now();
        let start = self.next_position();
        let added: Vec<SavedTab> = drafts
            .into_iter()
            .enumerate()
            .map(|(offset, draft)| SavedTab {
                id: Uuid::new_v4().to_string(),
                url: draft.url,
                title: draft.title,
                favicon_url: draft.favicon_url,
                position: start + offset as i32,
                created_at: now,
                partial: false,
            })
            .collect();

        self.tabs.extend(added.iter().cloned());
        self.touch();
        added
    }

    /// Append an existing tab (e.g. moved from another group) at the end.
    pub fn push_tab(&mut self, mut tab: SavedTab) -> SavedTab {
        tab.position = self.next_position();
        self.tabs.push(tab.clone());
        self.touch();
        tab
    }

    /// Remove a tab by id. Remaining positions are left as-is.
    pub fn remove_tab(&mut self, tab_id: &str) -> Option<SavedTab> {
        let index = self.tabs.iter().position(|t| t.id == tab_id)?;
        let removed = self.tabs.remove(index);
        self.touch();
        Some(removed)
    }

    /// Tabs in display order.
    pub fn sorted_tabs(&self) -> Vec<&SavedTab> {
        let mut tabs: Vec<&SavedTab> = self.tabs.iter().collect();
        tabs.sort_by_key(|t| t.position);
        tabs
    }

    fn next_position(&self) -> i32 {
        self.tabs
            .iter()
            .map(|t| t.position)
            .max()
            .map_or(0, |max| max + 1)
    }

    fn touch(&mut self) {
        // Guarantee a strictly newer timestamp even within one clock tick
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::milliseconds(1)
        };
    }
}

/// User-facing settings persisted alongside the groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Replicate groups to the remote store when signed in.
    pub sync_enabled: bool,
    pub auto_save_enabled: bool,
    pub auto_save_interval_minutes: u32,
    /// Remove a group from the list once its tabs are restored.
    pub restore_removes_group: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sync_enabled: true,
            auto_save_enabled: false,
            auto_save_interval_minutes: 30,
            restore_removes_group: false,
        }
    }
}
