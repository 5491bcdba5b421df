//! Tab groups and settings persisted on the device.
//!
//! This is the only state the UI reads while offline or signed out. Every
//! mutation is a full read-modify-write of the `tab_groups` key.

use crate::database::{
    keys, load_json, store_json, DbResult, LocalStore, SavedTab, Settings, TabDraft, TabGroup,
};
use std::sync::Arc;
use tracing::debug;

/// Typed access to groups and settings over a [`LocalStore`].
#[derive(Clone)]
pub struct LocalRecordStore {
    store: Arc<dyn LocalStore>,
}

impl LocalRecordStore {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// All groups, newest first.
    pub async fn list_groups(&self) -> DbResult<Vec<TabGroup>> {
        Ok(load_json(self.store.as_ref(), keys::TAB_GROUPS)
            .await?
            .unwrap_or_default())
    }

    pub async fn get_group(&self, group_id: &str) -> DbResult<Option<TabGroup>> {
        Ok(self
            .list_groups()
            .await?
            .into_iter()
            .find(|g| g.id == group_id))
    }

    /// Insert a group at the front, or replace it in place if the id exists.
    pub async fn save_group(&self, group: &TabGroup) -> DbResult<()> {
        let mut groups = self.list_groups().await?;
        match groups.iter_mut().find(|g| g.id == group.id) {
            Some(existing) => *existing = group.clone(),
            None => groups.insert(0, group.clone()),
        }
        self.write_groups(&groups).await
    }

    /// Replace the whole local view (used after a pull).
    pub async fn replace_all(&self, groups: &[TabGroup]) -> DbResult<()> {
        debug!(count = groups.len(), "Replacing local tab groups");
        self.write_groups(groups).await
    }

    /// Rename a group; returns the updated group.
    pub async fn rename_group(&self, group_id: &str, name: &str) -> DbResult<Option<TabGroup>> {
        self.update_group(group_id, |group| group.rename(name)).await
    }

    /// Append new tabs to a group; returns the updated group.
    pub async fn add_tabs(
        &self,
        group_id: &str,
        drafts: Vec<TabDraft>,
    ) -> DbResult<Option<TabGroup>> {
        self.update_group(group_id, |group| {
            group.add_tabs(drafts);
        })
        .await
    }

    /// Remove a group; returns it if it existed.
    pub async fn remove_group(&self, group_id: &str) -> DbResult<Option<TabGroup>> {
        let mut groups = self.list_groups().await?;
        let Some(index) = groups.iter().position(|g| g.id == group_id) else {
            return Ok(None);
        };
        let removed = groups.remove(index);
        self.write_groups(&groups).await?;
        Ok(Some(removed))
    }

    /// Remove one tab from a group; returns the removed tab.
    pub async fn remove_tab(&self, group_id: &str, tab_id: &str) -> DbResult<Option<SavedTab>> {
        let mut groups = self.list_groups().await?;
        let removed = groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .and_then(|group| group.remove_tab(tab_id));

        if removed.is_some() {
            self.write_groups(&groups).await?;
        }
        Ok(removed)
    }

    /// Move a tab to the end of another group. Returns both updated groups
    /// as `(source, target)`.
    pub async fn move_tab(
        &self,
        tab_id: &str,
        from_group_id: &str,
        to_group_id: &str,
    ) -> DbResult<Option<(TabGroup, TabGroup)>> {
        if from_group_id == to_group_id {
            return Ok(None);
        }

        let mut groups = self.list_groups().await?;
        let from_index = groups.iter().position(|g| g.id == from_group_id);
        let to_index = groups.iter().position(|g| g.id == to_group_id);
        let (Some(from_index), Some(to_index)) = (from_index, to_index) else {
            return Ok(None);
        };

        let Some(tab) = groups[from_index].remove_tab(tab_id) else {
            return Ok(None);
        };
        groups[to_index].push_tab(tab);

        let result = (groups[from_index].clone(), groups[to_index].clone());
        self.write_groups(&groups).await?;
        Ok(Some(result))
    }

    pub async fn settings(&self) -> DbResult<Settings> {
        Ok(load_json(self.store.as_ref(), keys::SETTINGS)
            .await?
            .unwrap_or_default())
    }

    pub async fn save_settings(&self, settings: &Settings) -> DbResult<()> {
        store_json(self.store.as_ref(), keys::SETTINGS, settings).await
    }

    async fn update_group(
        &self,
        group_id: &str,
        mutate: impl FnOnce(&mut TabGroup),
    ) -> DbResult<Option<TabGroup>> {
        let mut groups = self.list_groups().await?;
        let Some(group) = groups.iter_mut().find(|g| g.id == group_id) else {
            return Ok(None);
        };
        mutate(group);
        let updated = group.clone();
        self.write_groups(&groups).await?;
        Ok(Some(updated))
    }

    async fn write_groups(&self, groups: &[TabGroup]) -> DbResult<()> {
        store_json(self.store.as_ref(), keys::TAB_GROUPS, groups).await
    }
}
