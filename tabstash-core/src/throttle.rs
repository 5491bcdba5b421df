//! Save-abuse throttle: a per-user sliding window of save timestamps that
//! escalates from flagging to a permanent, remotely persisted block.

use crate::database::{keys, load_json, store_json, LocalStore};
use crate::sync::device::DeviceRegistry;
use crate::sync::models::{AbuseAction, AbuseEventRow};
use crate::sync::remote::{RemoteResult, RemoteStore};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Server-side function notified when a user is blocked.
pub const NOTIFY_ABUSE_FUNCTION: &str = "notify-abuse";

/// Throttle thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Sliding window length in seconds
    pub window_seconds: i64,
    /// Saves in the window at which the user is flagged
    pub flag_threshold: u32,
    /// Saves in the window at which the user is blocked
    pub block_threshold: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_seconds: 120,
            flag_threshold: 3,
            block_threshold: 5,
        }
    }
}

impl ThrottleConfig {
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_seconds)
    }

    /// Classify a save count within the window.
    pub fn classify(&self, saves_in_window: u32) -> ThrottleDecision {
        if saves_in_window < self.flag_threshold {
            ThrottleDecision::Normal
        } else if saves_in_window < self.block_threshold {
            ThrottleDecision::Flagged
        } else {
            ThrottleDecision::Blocked
        }
    }
}

/// Outcome of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Normal,
    Flagged,
    Blocked,
}

impl ThrottleDecision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked)
    }
}

/// Sliding-window save throttle.
pub struct SaveThrottle {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    devices: DeviceRegistry,
    config: ThrottleConfig,
}

impl SaveThrottle {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        config: ThrottleConfig,
    ) -> Self {
        Self {
            devices: DeviceRegistry::new(store.clone()),
            store,
            remote,
            config,
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Record a save for `user_id` now and classify it.
    pub async fn check_save(&self, user_id: &str) -> Result<ThrottleDecision> {
        self.check_save_at(user_id, Utc::now()).await
    }

    /// Record a save at `now` and classify it.
    ///
    /// A user already carrying the remote block flag is `Blocked` without
    /// recording anything. Remote writes (audit rows, block flag, owner
    /// notification) are best-effort.
    pub async fn check_save_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<ThrottleDecision> {
        match self.remote.is_user_blocked(user_id).await {
            Ok(true) => return Ok(ThrottleDecision::Blocked),
            Ok(false) => {}
            Err(e) => warn!(user_id, error = %e, "Block flag lookup failed; treating as not blocked"),
        }

        let key = keys::save_timestamps(user_id);
        let mut stamps: Vec<DateTime<Utc>> = load_json(self.store.as_ref(), &key)
            .await
            .unwrap_or_else(|e| {
                warn!(user_id, error = %e, "Resetting unreadable save window");
                None
            })
            .unwrap_or_default();

        let window = self.config.window();
        stamps.retain(|t| now - *t < window);
        stamps.push(now);
        store_json(self.store.as_ref(), &key, &stamps).await?;

        let save_count = u32::try_from(stamps.len()).unwrap_or(u32::MAX);
        let decision = self.config.classify(save_count);

        match decision {
            ThrottleDecision::Normal => {}
            ThrottleDecision::Flagged => {
                info!(user_id, save_count, "Save rate flagged");
                self.record_event(user_id, AbuseAction::Flagged, save_count, now)
                    .await;
            }
            ThrottleDecision::Blocked => {
                warn!(user_id, save_count, "Save rate exceeded; blocking user");
                best_effort("block user", self.remote.block_user(user_id).await);
                self.record_event(user_id, AbuseAction::Blocked, save_count, now)
                    .await;
                self.notify_owner(user_id, save_count).await;
            }
        }

        Ok(decision)
    }

    async fn record_event(&self, user_id: &str, action: AbuseAction, save_count: u32, now: DateTime<Utc>) {
        let device_id = match self.devices.get_or_create().await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "No device id for abuse event");
                String::new()
            }
        };

        let event = AbuseEventRow {
            user_id: user_id.to_string(),
            device_id,
            action,
            save_count,
            window_seconds: self.config.window_seconds,
            created_at: now,
        };
        best_effort("record abuse event", self.remote.insert_abuse_event(&event).await);
    }

    async fn notify_owner(&self, user_id: &str, save_count: u32) {
        let payload = serde_json::json!({
            "user_id": user_id,
            "save_count": save_count,
            "window_seconds": self.config.window_seconds,
        });
        // Result intentionally discarded
        let _ = best_effort(
            "notify owner",
            self.remote.invoke(NOTIFY_ABUSE_FUNCTION, payload).await,
        );
    }
}

fn best_effort<T>(operation: &str, result: RemoteResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(operation, error = %e, "Best-effort remote write failed");
            None
        }
    }
}
