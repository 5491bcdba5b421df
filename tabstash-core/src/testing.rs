//! In-memory remote store with failure injection, for tests.

use crate::sync::models::{AbuseEventRow, DeviceRow, GroupRow, TabRow};
use crate::sync::remote::{RemoteError, RemoteResult, RemoteStore, CAPACITY_EXCEEDED_MARKER};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::oneshot;

#[derive(Default)]
struct MockState {
    devices: HashMap<String, DeviceRow>,
    groups: HashMap<String, GroupRow>,
    tabs: HashMap<String, TabRow>,
    blocked: HashSet<String>,
    abuse_events: Vec<AbuseEventRow>,
    invocations: Vec<(String, Value)>,

    offline: bool,
    fail_devices: bool,
    fail_fetch: bool,
    fail_block_lookup: bool,
    failing_group_upserts: usize,
    failing_tabs: HashSet<String>,
    capacity_tabs: HashSet<String>,
    capacity_groups: bool,
    fetch_gate: Option<oneshot::Receiver<()>>,
}

/// Remote store double. Rows are kept as written (ciphertext included).
#[derive(Default)]
pub struct MockRemote {
    state: Mutex<MockState>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Fail every call with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.with(|s| s.offline = offline);
    }

    pub fn fail_device_registration(&self, fail: bool) {
        self.with(|s| s.fail_devices = fail);
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.with(|s| s.fail_fetch = fail);
    }

    pub fn fail_block_lookup(&self, fail: bool) {
        self.with(|s| s.fail_block_lookup = fail);
    }

    /// Fail the next `count` group upserts.
    pub fn fail_next_group_upserts(&self, count: usize) {
        self.with(|s| s.failing_group_upserts = count);
    }

    pub fn fail_tab(&self, tab_id: &str) {
        self.with(|s| s.failing_tabs.insert(tab_id.to_string()));
    }

    pub fn reject_tab_over_capacity(&self, tab_id: &str) {
        self.with(|s| s.capacity_tabs.insert(tab_id.to_string()));
    }

    pub fn reject_groups_over_capacity(&self, reject: bool) {
        self.with(|s| s.capacity_groups = reject);
    }

    pub fn clear_failures(&self) {
        self.with(|s| {
            s.offline = false;
            s.fail_devices = false;
            s.fail_fetch = false;
            s.fail_block_lookup = false;
            s.failing_group_upserts = 0;
            s.failing_tabs.clear();
            s.capacity_tabs.clear();
            s.capacity_groups = false;
        });
    }

    /// Hold the next `fetch_groups` call until `gate` fires.
    pub fn gate_next_fetch(&self, gate: oneshot::Receiver<()>) {
        self.with(|s| s.fetch_gate = Some(gate));
    }

    pub fn set_blocked(&self, user_id: &str) {
        self.with(|s| s.blocked.insert(user_id.to_string()));
    }

    /// Store a row (with nested tabs) directly, bypassing upserts.
    pub fn insert_raw(&self, mut group: GroupRow) {
        self.with(|s| {
            for tab in group.saved_tabs.drain(..) {
                s.tabs.insert(tab.id.clone(), tab);
            }
            s.groups.insert(group.id.clone(), group);
        });
    }

    pub fn group(&self, group_id: &str) -> Option<GroupRow> {
        self.with(|s| s.groups.get(group_id).cloned())
    }

    pub fn tab(&self, tab_id: &str) -> Option<TabRow> {
        self.with(|s| s.tabs.get(tab_id).cloned())
    }

    pub fn group_count(&self) -> usize {
        self.with(|s| s.groups.len())
    }

    pub fn tab_count(&self) -> usize {
        self.with(|s| s.tabs.len())
    }

    pub fn device_count(&self) -> usize {
        self.with(|s| s.devices.len())
    }

    pub fn is_blocked(&self, user_id: &str) -> bool {
        self.with(|s| s.blocked.contains(user_id))
    }

    pub fn abuse_events(&self) -> Vec<AbuseEventRow> {
        self.with(|s| s.abuse_events.clone())
    }

    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.with(|s| s.invocations.clone())
    }

    fn check_online(state: &MockState) -> RemoteResult<()> {
        if state.offline {
            return Err(RemoteError::new("network unreachable"));
        }
        Ok(())
    }
}

fn capacity_error() -> RemoteError {
    RemoteError::with_status(
        400,
        format!("{}: free tier allows a limited number of records", CAPACITY_EXCEEDED_MARKER),
    )
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn upsert_device(&self, device: &DeviceRow) -> RemoteResult<()> {
        self.with(|s| {
            Self::check_online(s)?;
            if s.fail_devices {
                return Err(RemoteError::with_status(500, "device registration failed"));
            }
            s.devices.insert(device.id.clone(), device.clone());
            Ok(())
        })
    }

    async fn upsert_group(&self, group: &GroupRow) -> RemoteResult<()> {
        self.with(|s| {
            Self::check_online(s)?;
            if s.failing_group_upserts > 0 {
                s.failing_group_upserts -= 1;
                return Err(RemoteError::with_status(503, "service unavailable"));
            }
            if s.capacity_groups {
                return Err(capacity_error());
            }
            s.groups.insert(group.id.clone(), group.clone());
            Ok(())
        })
    }

    async fn upsert_tab(&self, tab: &TabRow) -> RemoteResult<()> {
        self.with(|s| {
            Self::check_online(s)?;
            if s.capacity_tabs.contains(&tab.id) {
                return Err(capacity_error());
            }
            if s.failing_tabs.contains(&tab.id) {
                return Err(RemoteError::with_status(500, "tab insert failed"));
            }
            s.tabs.insert(tab.id.clone(), tab.clone());
            Ok(())
        })
    }

    async fn delete_group(&self, group_id: &str) -> RemoteResult<()> {
        self.with(|s| {
            Self::check_online(s)?;
            s.groups.remove(group_id);
            s.tabs.retain(|_, t| t.group_id != group_id);
            Ok(())
        })
    }

    async fn delete_tab(&self, tab_id: &str) -> RemoteResult<()> {
        self.with(|s| {
            Self::check_online(s)?;
            s.tabs.remove(tab_id);
            Ok(())
        })
    }

    async fn fetch_groups(&self, user_id: &str) -> RemoteResult<Vec<GroupRow>> {
        if let Some(gate) = self.with(|s| s.fetch_gate.take()) {
            let _ = gate.await;
        }

        self.with(|s| {
            Self::check_online(s)?;
            if s.fail_fetch {
                return Err(RemoteError::with_status(500, "fetch failed"));
            }

            let mut groups: Vec<GroupRow> = s
                .groups
                .values()
                .filter(|g| g.user_id == user_id)
                .cloned()
                .map(|mut g| {
                    g.saved_tabs = s
                        .tabs
                        .values()
                        .filter(|t| t.group_id == g.id)
                        .cloned()
                        .collect();
                    g
                })
                .collect();
            groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(groups)
        })
    }

    async fn is_user_blocked(&self, user_id: &str) -> RemoteResult<bool> {
        self.with(|s| {
            Self::check_online(s)?;
            if s.fail_block_lookup {
                return Err(RemoteError::with_status(500, "profile lookup failed"));
            }
            Ok(s.blocked.contains(user_id))
        })
    }

    async fn block_user(&self, user_id: &str) -> RemoteResult<()> {
        self.with(|s| {
            Self::check_online(s)?;
            s.blocked.insert(user_id.to_string());
            Ok(())
        })
    }

    async fn insert_abuse_event(&self, event: &AbuseEventRow) -> RemoteResult<()> {
        self.with(|s| {
            Self::check_online(s)?;
            s.abuse_events.push(event.clone());
            Ok(())
        })
    }

    async fn invoke(&self, function: &str, payload: Value) -> RemoteResult<Value> {
        self.with(|s| {
            Self::check_online(s)?;
            s.invocations.push((function.to_string(), payload));
            Ok(Value::Null)
        })
    }
}
