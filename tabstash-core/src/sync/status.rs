//! Sync health derivation.

use crate::sync::models::SyncStatus;
use chrono::{DateTime, Utc};

/// Consecutive failures at which status turns from pending to failed.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Consecutive push/flush failures since the last full success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncFailureState {
    pub consecutive_failures: u32,
    pub first_failure_at: Option<DateTime<Utc>>,
}

impl SyncFailureState {
    pub fn record_failure(&mut self) {
        self.record_failure_at(Utc::now());
    }

    pub fn record_failure_at(&mut self, now: DateTime<Utc>) {
        if self.consecutive_failures == 0 {
            self.first_failure_at = Some(now);
        }
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Inputs to [`derive_status`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusInputs {
    pub queue_size: usize,
    pub failure_count: u32,
}

/// Empty queue is synced; otherwise pending until the failure count
/// reaches [`FAILURE_THRESHOLD`].
pub fn derive_status(inputs: StatusInputs) -> SyncStatus {
    if inputs.queue_size == 0 {
        SyncStatus::Synced
    } else if inputs.failure_count < FAILURE_THRESHOLD {
        SyncStatus::Pending
    } else {
        SyncStatus::Failed
    }
}
