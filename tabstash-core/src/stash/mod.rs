//! TabStash - coordinates the local record store, the save throttle and
//! the sync engine behind the user-facing actions.
//!
//! Every mutation lands in the local store first and succeeds offline;
//! replication is attempted afterwards and its failures are absorbed by the
//! retry queue.

#[cfg(test)]
mod tests;

use crate::{
    crypto::KeyManager,
    database::{LocalRecordStore, LocalStore, SavedTab, Settings, TabDraft, TabGroup},
    sync::{FlushReport, PushOutcome, RemoteStore, SessionProvider, SyncConfig, SyncEngine, SyncStatus},
    throttle::{SaveThrottle, ThrottleDecision},
    Result, TabStashError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to the remote copy after a local save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveSync {
    /// Sync disabled in settings, or no session.
    Skipped,
    /// The save throttle blocked the push; the group exists locally only.
    Blocked,
    Pushed(PushOutcome),
    /// The remote store refused the records over the account's tier limit.
    CapacityExceeded(String),
}

/// Result of a save: the locally stored group plus the remote outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub group: TabGroup,
    /// Throttle classification, when the throttle ran.
    pub throttle: Option<ThrottleDecision>,
    pub sync: SaveSync,
}

/// Outcome of [`TabStash::load_groups`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadResult {
    Applied(Vec<TabGroup>),
    /// A newer load started while this one was in flight; its result was discarded.
    Stale,
}

/// Monotonic load counter. A load applies its result only if no newer
/// load began in the meantime.
#[derive(Debug, Default)]
pub struct LoadGuard {
    latest: AtomicU64,
}

impl LoadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a load and return its ticket.
    pub fn begin(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }
}

/// User-facing tab stash.
pub struct TabStash {
    records: LocalRecordStore,
    engine: Arc<SyncEngine>,
    throttle: SaveThrottle,
    load_guard: LoadGuard,
}

impl TabStash {
    /// Wire up the stash over a local store, a remote store and a session
    /// source.
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        sessions: Arc<dyn SessionProvider>,
        config: &SyncConfig,
    ) -> Self {
        let keys = Arc::new(KeyManager::new(
            store.clone(),
            config.encryption_secret.clone(),
        ));
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            remote.clone(),
            sessions,
            keys,
        ));
        let throttle = SaveThrottle::new(store.clone(), remote, config.throttle.clone());

        Self {
            records: LocalRecordStore::new(store),
            engine,
            throttle,
            load_guard: LoadGuard::new(),
        }
    }

    pub fn records(&self) -> &LocalRecordStore {
        &self.records
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub async fn settings(&self) -> Result<Settings> {
        Ok(self.records.settings().await?)
    }

    pub async fn update_settings(&self, settings: &Settings) -> Result<()> {
        Ok(self.records.save_settings(settings).await?)
    }

    // --- Saving ---

    /// Save a new group of tabs.
    pub async fn save_tabs(
        &self,
        name: &str,
        drafts: Vec<TabDraft>,
        is_auto_save: bool,
    ) -> Result<SaveReport> {
        if drafts.is_empty() {
            return Err(TabStashError::InvalidInput(
                "a group needs at least one tab".to_string(),
            ));
        }

        let device_id = self.engine.devices().get_or_create().await?;
        let group = TabGroup::new(name, drafts, is_auto_save, device_id);
        self.save_group(&group).await
    }

    /// Store a group locally (insert or replace), then push it.
    pub async fn save_group(&self, group: &TabGroup) -> Result<SaveReport> {
        self.records.save_group(group).await?;
        info!(group_id = %group.id, tabs = group.tabs.len(), "Saved group locally");
        self.replicate(group.clone(), true).await
    }

    /// Append tabs to an existing group.
    pub async fn add_tabs(&self, group_id: &str, drafts: Vec<TabDraft>) -> Result<SaveReport> {
        let group = self
            .records
            .add_tabs(group_id, drafts)
            .await?
            .ok_or_else(|| not_found("group", group_id))?;
        self.replicate(group, true).await
    }

    pub async fn rename_group(&self, group_id: &str, name: &str) -> Result<SaveReport> {
        let group = self
            .records
            .rename_group(group_id, name)
            .await?
            .ok_or_else(|| not_found("group", group_id))?;
        self.replicate(group, false).await
    }

    // --- Removal and reordering ---

    pub async fn delete_group(&self, group_id: &str) -> Result<Option<TabGroup>> {
        let removed = self.records.remove_group(group_id).await?;
        if removed.is_some() && self.sync_enabled().await? {
            let outcome = self.engine.push_group_deletion(group_id).await?;
            debug!(group_id, ?outcome, "Group deletion pushed");
        }
        Ok(removed)
    }

    pub async fn delete_tab(&self, group_id: &str, tab_id: &str) -> Result<Option<SavedTab>> {
        let removed = self.records.remove_tab(group_id, tab_id).await?;
        if removed.is_some() && self.sync_enabled().await? {
            let outcome = self.engine.push_tab_deletion(tab_id).await?;
            debug!(tab_id, ?outcome, "Tab deletion pushed");
        }
        Ok(removed)
    }

    /// Move a tab to the end of another group. Both groups are pushed so
    /// the remote tab row picks up its new group.
    pub async fn move_tab(
        &self,
        tab_id: &str,
        from_group_id: &str,
        to_group_id: &str,
    ) -> Result<Option<(TabGroup, TabGroup)>> {
        let Some((source, target)) = self
            .records
            .move_tab(tab_id, from_group_id, to_group_id)
            .await?
        else {
            return Ok(None);
        };

        self.replicate(target.clone(), false).await?;
        self.replicate(source.clone(), false).await?;
        Ok(Some((source, target)))
    }

    /// Return a group for reopening. Removes it afterwards when the
    /// `restore_removes_group` setting is on.
    pub async fn restore_group(&self, group_id: &str) -> Result<TabGroup> {
        let group = self
            .records
            .get_group(group_id)
            .await?
            .ok_or_else(|| not_found("group", group_id))?;

        if self.records.settings().await?.restore_removes_group {
            self.delete_group(group_id).await?;
        }
        Ok(group)
    }

    // --- Loading and sync ---

    /// Load all groups. With sync on and a session, the decrypted remote
    /// snapshot replaces the local view; otherwise the local view is
    /// returned. A load overtaken by a newer one returns [`LoadResult::Stale`]
    /// without touching the local store.
    pub async fn load_groups(&self) -> Result<LoadResult> {
        let ticket = self.load_guard.begin();

        let remote = if self.sync_enabled().await? {
            match self.engine.pull_all_groups().await {
                Ok(pulled) => Some(pulled),
                Err(TabStashError::Remote(e)) => {
                    warn!(error = %e, "Pull failed; using local groups");
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        if !self.load_guard.is_current(ticket) {
            debug!(ticket, "Discarding stale load");
            return Ok(LoadResult::Stale);
        }

        let groups = match remote {
            Some(pulled) => {
                let groups: Vec<TabGroup> = pulled.into_iter().map(|g| g.into_group()).collect();
                self.records.replace_all(&groups).await?;
                groups
            }
            None => self.records.list_groups().await?,
        };
        Ok(LoadResult::Applied(groups))
    }

    pub async fn sync_status(&self) -> Result<SyncStatus> {
        self.engine.sync_status().await
    }

    pub async fn flush(&self) -> Result<FlushReport> {
        self.engine.flush_queue().await
    }

    /// Forget the signed-in user's cached key. Ending the session itself is
    /// up to the session provider.
    pub async fn sign_out(&self) -> Result<()> {
        if let Some(session) = self.engine.sessions().get_session().await {
            self.engine.keys().clear_cached_key(&session.user_id).await?;
            info!(user_id = %session.user_id, "Cleared cached encryption key");
        }
        Ok(())
    }

    // --- Internal helpers ---

    async fn sync_enabled(&self) -> Result<bool> {
        Ok(self.records.settings().await?.sync_enabled
            && self.engine.sessions().get_session().await.is_some())
    }

    async fn replicate(&self, group: TabGroup, throttled: bool) -> Result<SaveReport> {
        if !self.records.settings().await?.sync_enabled {
            return Ok(report(group, None, SaveSync::Skipped));
        }
        let Some(session) = self.engine.sessions().get_session().await else {
            return Ok(report(group, None, SaveSync::Skipped));
        };

        let decision = if throttled {
            match self.throttle.check_save(&session.user_id).await {
                Ok(decision) => Some(decision),
                Err(e) => {
                    warn!(error = %e, "Save throttle unavailable");
                    None
                }
            }
        } else {
            None
        };

        if decision.is_some_and(|d| d.is_blocked()) {
            warn!(group_id = %group.id, "Save blocked; kept locally only");
            return Ok(report(group, decision, SaveSync::Blocked));
        }

        let sync = match self.engine.push_group(&group).await {
            Ok(outcome) => SaveSync::Pushed(outcome),
            Err(TabStashError::CapacityExceeded(message)) => SaveSync::CapacityExceeded(message),
            Err(e) => return Err(e),
        };
        Ok(report(group, decision, sync))
    }
}

fn report(group: TabGroup, throttle: Option<ThrottleDecision>, sync: SaveSync) -> SaveReport {
    SaveReport {
        group,
        throttle,
        sync,
    }
}

fn not_found(kind: &str, id: &str) -> TabStashError {
    TabStashError::NotFound(format!("{} {}", kind, id))
}
