//! Sync engine: push, pull, retry-queue flush and sync health.
//!
//! Local writes never wait on the network: a push that fails is captured in
//! the retry queue and only becomes visible through [`SyncEngine::sync_status`].

use crate::crypto::{EncryptionKey, KeyManager};
use crate::database::{LocalStore, SavedTab, TabGroup};
use crate::sync::crypto::{decrypt_group_row, encrypt_group_row, encrypt_tab_row};
use crate::sync::device::DeviceRegistry;
use crate::sync::models::{
    EntityType, NewQueueItem, PulledGroup, QueueOperation, QueuePayload, RetryQueueItem,
    SyncStatus,
};
use crate::sync::queue::RetryQueue;
use crate::sync::remote::RemoteStore;
use crate::sync::session::SessionProvider;
use crate::sync::status::{derive_status, StatusInputs, SyncFailureState};
use crate::{Result, TabStashError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Result of pushing a single mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Everything reached the remote store.
    Synced,
    /// No authenticated session; nothing was sent or queued.
    NoSession,
    /// The group row (or device registration) failed; the whole group was queued.
    GroupQueued,
    /// The group row was stored but some tabs failed and were queued individually.
    Partial { queued_tabs: usize },
    /// A remote delete failed and was queued.
    DeletionQueued,
}

/// Per-item tallies of a retry-queue flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Items removed because the remote store rejected them over capacity.
    pub dropped: usize,
}

/// Orchestrates remote replication for the signed-in user.
pub struct SyncEngine {
    remote: Arc<dyn RemoteStore>,
    sessions: Arc<dyn SessionProvider>,
    keys: Arc<KeyManager>,
    devices: DeviceRegistry,
    queue: RetryQueue,
    failures: Mutex<SyncFailureState>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        sessions: Arc<dyn SessionProvider>,
        keys: Arc<KeyManager>,
    ) -> Self {
        Self {
            remote,
            sessions,
            keys,
            devices: DeviceRegistry::new(store.clone()),
            queue: RetryQueue::new(store),
            failures: Mutex::new(SyncFailureState::default()),
        }
    }

    pub fn queue(&self) -> &RetryQueue {
        &self.queue
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn sessions(&self) -> &Arc<dyn SessionProvider> {
        &self.sessions
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Push a group and all of its tabs.
    ///
    /// Once the group row is stored, queued writes holding older snapshots
    /// of the group or its tabs are dropped. Records marked `partial` are
    /// left untouched remotely.
    ///
    /// Remote failures are queued, not returned. The errors that do surface
    /// are configuration problems (no encryption secret), local storage
    /// failures and [`TabStashError::CapacityExceeded`].
    pub async fn push_group(&self, group: &TabGroup) -> Result<PushOutcome> {
        let Some(session) = self.sessions.get_session().await else {
            debug!(group_id = %group.id, "No session; skipping push");
            return Ok(PushOutcome::NoSession);
        };
        let user_id = session.user_id.as_str();
        let key = self.keys.get_or_derive_key(user_id).await?;

        if let Err(e) = self.register_device(user_id).await {
            warn!(group_id = %group.id, error = %e, "Device registration failed; queueing group");
            return self.queue_group(group).await;
        }

        if let Err(e) = self.upload_group_row(group, user_id, &key).await {
            if let Some(capacity) = capacity_error(&e) {
                return Err(capacity);
            }
            warn!(group_id = %group.id, error = %e, "Group push failed; queueing group");
            return self.queue_group(group).await;
        }
        if !group.partial {
            self.supersede_group(group).await?;
        }

        let mut queued_tabs = 0;
        for tab in group.sorted_tabs() {
            if let Err(e) = self.upload_tab(&group.id, tab, user_id, &key).await {
                if let Some(capacity) = capacity_error(&e) {
                    if queued_tabs > 0 {
                        self.record_failure();
                    }
                    return Err(capacity);
                }
                warn!(group_id = %group.id, tab_id = %tab.id, error = %e, "Tab push failed; queueing tab");
                self.queue
                    .enqueue(NewQueueItem::tab_create(&group.id, tab))
                    .await?;
                queued_tabs += 1;
            }
        }

        if queued_tabs > 0 {
            self.record_failure();
            return Ok(PushOutcome::Partial { queued_tabs });
        }

        self.reset_failures();
        debug!(group_id = %group.id, tabs = group.tabs.len(), "Pushed group");
        Ok(PushOutcome::Synced)
    }

    /// Delete a group (and, remotely, its tabs).
    pub async fn push_group_deletion(&self, group_id: &str) -> Result<PushOutcome> {
        self.push_deletion(EntityType::Group, group_id).await
    }

    pub async fn push_tab_deletion(&self, tab_id: &str) -> Result<PushOutcome> {
        self.push_deletion(EntityType::Tab, tab_id).await
    }

    /// Fetch and decrypt every group for the signed-in user, newest first.
    ///
    /// Fields that fail to decrypt come back as `None`; the rest of the
    /// batch is still returned.
    pub async fn pull_all_groups(&self) -> Result<Vec<PulledGroup>> {
        let Some(session) = self.sessions.get_session().await else {
            return Ok(Vec::new());
        };
        let key = self.keys.get_or_derive_key(&session.user_id).await?;

        let rows = self.remote.fetch_groups(&session.user_id).await?;
        let groups: Vec<PulledGroup> = rows
            .into_iter()
            .map(|row| decrypt_group_row(row, &key))
            .collect();

        debug!(count = groups.len(), "Pulled groups");
        Ok(groups)
    }

    /// Replay the retry queue in insertion order.
    pub async fn flush_queue(&self) -> Result<FlushReport> {
        let items = self.queue.get_all().await?;

        let Some(session) = self.sessions.get_session().await else {
            return Ok(FlushReport {
                failed: items.len(),
                ..FlushReport::default()
            });
        };

        if items.is_empty() {
            self.reset_failures();
            return Ok(FlushReport::default());
        }

        let user_id = session.user_id.as_str();
        let key = self.keys.get_or_derive_key(user_id).await?;

        if let Err(e) = self.register_device(user_id).await {
            warn!(error = %e, pending = items.len(), "Device registration failed; flush skipped");
            self.record_failure();
            return Ok(FlushReport {
                failed: items.len(),
                ..FlushReport::default()
            });
        }

        let mut report = FlushReport::default();
        for item in &items {
            match self.replay(item, user_id, &key).await {
                Ok(()) => {
                    self.queue.dequeue(&item.id).await?;
                    report.succeeded += 1;
                }
                Err(e) if capacity_error(&e).is_some() => {
                    warn!(item_id = %item.id, entity_id = %item.entity_id, error = %e, "Dropping queued item over capacity");
                    self.queue.dequeue(&item.id).await?;
                    report.dropped += 1;
                }
                Err(e) => {
                    debug!(item_id = %item.id, error = %e, "Replay failed");
                    self.queue.increment_retries(&item.id).await?;
                    report.failed += 1;
                }
            }
        }

        if report.failed == 0 {
            self.reset_failures();
        } else {
            self.record_failure();
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            dropped = report.dropped,
            "Flushed retry queue"
        );
        Ok(report)
    }

    /// Flush the retry queue every `interval` until the handle is aborted.
    pub fn spawn_periodic_flush(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = engine.flush_queue().await {
                    warn!(error = %e, "Periodic flush failed");
                }
            }
        })
    }

    pub async fn sync_status(&self) -> Result<SyncStatus> {
        let queue_size = self.queue.size().await?;
        Ok(derive_status(StatusInputs {
            queue_size,
            failure_count: self.failure_state().consecutive_failures,
        }))
    }

    pub fn failure_state(&self) -> SyncFailureState {
        *self.failures.lock().unwrap_or_else(|p| p.into_inner())
    }

    // --- Internal helpers ---

    async fn push_deletion(&self, entity_type: EntityType, entity_id: &str) -> Result<PushOutcome> {
        if self.sessions.get_session().await.is_none() {
            return Ok(PushOutcome::NoSession);
        }
        self.supersede_deletion(entity_type, entity_id).await?;

        if let Err(e) = self.delete_remote(entity_type, entity_id).await {
            warn!(entity_id, entity_type = ?entity_type, error = %e, "Remote delete failed; queueing");
            self.queue
                .enqueue(NewQueueItem::delete(entity_type, entity_id))
                .await?;
            self.record_failure();
            return Ok(PushOutcome::DeletionQueued);
        }

        self.reset_failures();
        Ok(PushOutcome::Synced)
    }

    async fn queue_group(&self, group: &TabGroup) -> Result<PushOutcome> {
        if !group.partial {
            self.supersede_group(group).await?;
        }
        self.queue.enqueue(NewQueueItem::group_create(group)).await?;
        self.record_failure();
        Ok(PushOutcome::GroupQueued)
    }

    async fn replay(&self, item: &RetryQueueItem, user_id: &str, key: &EncryptionKey) -> Result<()> {
        match (item.operation, &item.payload) {
            (QueueOperation::Delete, _) => self.delete_remote(item.entity_type, &item.entity_id).await,
            (_, QueuePayload::Group(group)) => {
                self.upload_group_row(group, user_id, key).await?;
                for tab in group.sorted_tabs() {
                    self.upload_tab(&group.id, tab, user_id, key).await?;
                }
                Ok(())
            }
            (_, QueuePayload::Tab(snapshot)) => {
                self.upload_tab(&snapshot.group_id, &snapshot.tab, user_id, key)
                    .await
            }
            (_, QueuePayload::Empty) => Err(TabStashError::InvalidInput(format!(
                "queued {:?} for {} has no payload",
                item.operation, item.entity_id
            ))),
        }
    }

    async fn register_device(&self, user_id: &str) -> Result<()> {
        let row = self.devices.device_row(user_id).await?;
        self.remote.upsert_device(&row).await?;
        Ok(())
    }

    /// Drop queued writes older than `group`: earlier snapshots of the group
    /// and of any tab it now holds, wherever that tab was queued.
    async fn supersede_group(&self, group: &TabGroup) -> Result<()> {
        let tab_ids: HashSet<&str> = group.tabs.iter().map(|t| t.id.as_str()).collect();
        let dropped = self
            .queue
            .prune(|mut item| {
                match &mut item.payload {
                    QueuePayload::Group(queued) if queued.id == group.id => return None,
                    QueuePayload::Group(queued) => {
                        queued.tabs.retain(|t| !tab_ids.contains(t.id.as_str()))
                    }
                    QueuePayload::Tab(snapshot)
                        if snapshot.group_id == group.id
                            || tab_ids.contains(snapshot.tab.id.as_str()) =>
                    {
                        return None
                    }
                    _ => {}
                }
                Some(item)
            })
            .await?;

        if dropped > 0 {
            debug!(group_id = %group.id, dropped, "Dropped superseded queued writes");
        }
        Ok(())
    }

    /// Drop queued writes that would recreate a deleted entity. Deleting a
    /// group also covers its queued tabs; deleting a tab strips it from
    /// queued group snapshots.
    async fn supersede_deletion(&self, entity_type: EntityType, entity_id: &str) -> Result<()> {
        let dropped = self
            .queue
            .prune(|mut item| {
                if item.entity_type == entity_type && item.entity_id == entity_id {
                    return None;
                }
                match (&mut item.payload, entity_type) {
                    (QueuePayload::Tab(snapshot), EntityType::Group)
                        if snapshot.group_id == entity_id =>
                    {
                        return None
                    }
                    (QueuePayload::Group(queued), EntityType::Tab) => {
                        queued.tabs.retain(|t| t.id != entity_id)
                    }
                    _ => {}
                }
                Some(item)
            })
            .await?;

        if dropped > 0 {
            debug!(entity_id, entity_type = ?entity_type, dropped, "Dropped queued writes for deleted entity");
        }
        Ok(())
    }

    async fn upload_group_row(&self, group: &TabGroup, user_id: &str, key: &EncryptionKey) -> Result<()> {
        if group.partial {
            debug!(group_id = %group.id, "Group name unreadable locally; keeping remote row");
            return Ok(());
        }
        let row = encrypt_group_row(group, user_id, key)?;
        self.remote.upsert_group(&row).await?;
        Ok(())
    }

    async fn upload_tab(
        &self,
        group_id: &str,
        tab: &SavedTab,
        user_id: &str,
        key: &EncryptionKey,
    ) -> Result<()> {
        if tab.partial {
            debug!(tab_id = %tab.id, "Tab fields unreadable locally; keeping remote row");
            return Ok(());
        }
        let row = encrypt_tab_row(group_id, tab, user_id, key)?;
        self.remote.upsert_tab(&row).await?;
        Ok(())
    }

    async fn delete_remote(&self, entity_type: EntityType, entity_id: &str) -> Result<()> {
        match entity_type {
            EntityType::Group => self.remote.delete_group(entity_id).await?,
            EntityType::Tab => self.remote.delete_tab(entity_id).await?,
        }
        Ok(())
    }

    fn record_failure(&self) {
        self.failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .record_failure();
    }

    fn reset_failures(&self) {
        self.failures.lock().unwrap_or_else(|p| p.into_inner()).reset();
    }
}

/// Map a remote capacity rejection to the surfaced error.
fn capacity_error(err: &TabStashError) -> Option<TabStashError> {
    match err {
        TabStashError::Remote(e) if e.is_capacity_exceeded() => {
            Some(TabStashError::CapacityExceeded(e.message.clone()))
        }
        _ => None,
    }
}
