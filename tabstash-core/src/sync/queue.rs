//! Durable FIFO of failed remote mutations.
//!
//! The whole queue lives under one local-store key and every operation is a
//! full read-modify-write. Items are replayed oldest first.

use crate::database::{keys, load_json, store_json, LocalStore};
use crate::sync::models::{NewQueueItem, RetryQueueItem};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Retry ceiling. An item whose counter reaches this value is dropped.
pub const MAX_RETRIES: u32 = 5;

/// Retry queue over the local store.
#[derive(Clone)]
pub struct RetryQueue {
    store: Arc<dyn LocalStore>,
}

impl RetryQueue {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Append an item with a fresh id, the current time and zero retries.
    pub async fn enqueue(&self, item: NewQueueItem) -> Result<RetryQueueItem> {
        let queued = RetryQueueItem {
            id: Uuid::new_v4().to_string(),
            operation: item.operation,
            entity_type: item.entity_type,
            entity_id: item.entity_id,
            payload: item.payload,
            created_at: Utc::now(),
            retries: 0,
        };

        let mut items = self.get_all().await?;
        items.push(queued.clone());
        self.write(&items).await?;

        debug!(
            item_id = %queued.id,
            entity_id = %queued.entity_id,
            operation = ?queued.operation,
            "Queued remote mutation for retry"
        );
        Ok(queued)
    }

    /// Remove an item. Unknown ids are ignored.
    pub async fn dequeue(&self, item_id: &str) -> Result<()> {
        let mut items = self.get_all().await?;
        let before = items.len();
        items.retain(|i| i.id != item_id);
        if items.len() != before {
            self.write(&items).await?;
        }
        Ok(())
    }

    /// Bump an item's retry counter. Returns the new count, or `None` when
    /// the item reached [`MAX_RETRIES`] and was dropped or was not queued.
    pub async fn increment_retries(&self, item_id: &str) -> Result<Option<u32>> {
        let mut items = self.get_all().await?;
        let Some(index) = items.iter().position(|i| i.id == item_id) else {
            return Ok(None);
        };

        let retries = items[index].retries + 1;
        if retries >= MAX_RETRIES {
            let dropped = items.remove(index);
            warn!(
                item_id = %dropped.id,
                entity_id = %dropped.entity_id,
                entity_type = ?dropped.entity_type,
                "Dropping queued mutation after {} retries",
                MAX_RETRIES
            );
            self.write(&items).await?;
            return Ok(None);
        }

        items[index].retries = retries;
        self.write(&items).await?;
        Ok(Some(retries))
    }

    /// Rewrite the queue in one pass. `keep` returns the (possibly edited)
    /// item to keep, or `None` to drop it. Returns the number dropped.
    pub async fn prune<F>(&self, mut keep: F) -> Result<usize>
    where
        F: FnMut(RetryQueueItem) -> Option<RetryQueueItem>,
    {
        let items = self.get_all().await?;
        let before = items.clone();
        let kept: Vec<RetryQueueItem> = items.into_iter().filter_map(&mut keep).collect();
        if kept == before {
            return Ok(0);
        }

        let dropped = before.len() - kept.len();
        self.write(&kept).await?;
        debug!(dropped, remaining = kept.len(), "Pruned retry queue");
        Ok(dropped)
    }

    /// All queued items in insertion order.
    pub async fn get_all(&self) -> Result<Vec<RetryQueueItem>> {
        Ok(load_json(self.store.as_ref(), keys::RETRY_QUEUE)
            .await?
            .unwrap_or_default())
    }

    pub async fn size(&self) -> Result<usize> {
        Ok(self.get_all().await?.len())
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.remove(keys::RETRY_QUEUE).await?;
        Ok(())
    }

    async fn write(&self, items: &[RetryQueueItem]) -> Result<()> {
        store_json(self.store.as_ref(), keys::RETRY_QUEUE, items).await?;
        Ok(())
    }
}
