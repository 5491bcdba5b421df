use super::*;
use crate::crypto::{decrypt_field, derive_user_key, encrypt_field};
use crate::database::MemoryStore;
use crate::sync::{EntityType, Session, StaticSession};
use crate::testing::MockRemote;
use tokio::sync::oneshot;

struct Fixture {
    stash: TabStash,
    remote: Arc<MockRemote>,
    sessions: Arc<StaticSession>,
    store: Arc<MemoryStore>,
}

fn config() -> SyncConfig {
    SyncConfig {
        encryption_secret: Some("stash-test-secret".to_string()),
        ..SyncConfig::default()
    }
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(MockRemote::new());
    let sessions = Arc::new(StaticSession::signed_in(Session::new("user-1", "token")));
    let stash = TabStash::new(store.clone(), remote.clone(), sessions.clone(), &config());
    Fixture {
        stash,
        remote,
        sessions,
        store,
    }
}

fn drafts(n: usize) -> Vec<TabDraft> {
    (0..n)
        .map(|i| TabDraft::new(format!("https://example.com/{}", i), format!("Tab {}", i)))
        .collect()
}

#[tokio::test]
async fn test_save_pushes_when_online() {
    let f = fixture();

    let report = f.stash.save_tabs("Research", drafts(2), false).await.unwrap();
    assert_eq!(report.sync, SaveSync::Pushed(PushOutcome::Synced));
    assert_eq!(report.throttle, Some(ThrottleDecision::Normal));

    let local = f.stash.records().list_groups().await.unwrap();
    assert_eq!(local, vec![report.group.clone()]);
    assert!(f.remote.group(&report.group.id).is_some());
    assert_eq!(f.remote.tab_count(), 2);
    assert_eq!(f.stash.sync_status().await.unwrap(), SyncStatus::Synced);
}

#[tokio::test]
async fn test_offline_save_keeps_local_copy_and_queues() {
    let f = fixture();
    f.remote.set_offline(true);

    let report = f.stash.save_tabs("Offline", drafts(3), false).await.unwrap();
    assert_eq!(report.sync, SaveSync::Pushed(PushOutcome::GroupQueued));

    let local = f.stash.records().get_group(&report.group.id).await.unwrap();
    assert_eq!(local.as_ref().map(|g| g.tabs.len()), Some(3));
    assert_eq!(f.remote.group_count(), 0);
    assert_eq!(f.stash.sync_status().await.unwrap(), SyncStatus::Pending);

    f.remote.set_offline(false);
    let flushed = f.stash.flush().await.unwrap();
    assert_eq!(flushed.succeeded, 1);
    assert_eq!(f.remote.tab_count(), 3);
    assert_eq!(f.stash.sync_status().await.unwrap(), SyncStatus::Synced);
}

#[tokio::test]
async fn test_signed_out_save_is_local_only() {
    let f = fixture();
    f.sessions.sign_out();

    let report = f.stash.save_tabs("Local", drafts(1), false).await.unwrap();
    assert_eq!(report.sync, SaveSync::Skipped);
    assert_eq!(report.throttle, None);
    assert_eq!(f.stash.records().list_groups().await.unwrap().len(), 1);
    assert_eq!(f.stash.engine().queue().size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_sync_disabled_skips_push() {
    let f = fixture();
    let settings = Settings {
        sync_enabled: false,
        ..Settings::default()
    };
    f.stash.update_settings(&settings).await.unwrap();

    let report = f.stash.save_tabs("Private", drafts(1), false).await.unwrap();
    assert_eq!(report.sync, SaveSync::Skipped);
    assert_eq!(f.remote.group_count(), 0);
}

#[tokio::test]
async fn test_empty_save_is_rejected() {
    let f = fixture();
    let err = f.stash.save_tabs("Nothing", Vec::new(), false).await.unwrap_err();
    assert!(matches!(err, TabStashError::InvalidInput(_)));
}

#[tokio::test]
async fn test_blocked_user_keeps_local_save() {
    let f = fixture();
    f.remote.set_blocked("user-1");

    let report = f.stash.save_tabs("Blocked", drafts(1), false).await.unwrap();
    assert_eq!(report.sync, SaveSync::Blocked);
    assert_eq!(report.throttle, Some(ThrottleDecision::Blocked));
    assert_eq!(f.remote.group_count(), 0);
    assert_eq!(f.stash.records().list_groups().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rapid_saves_escalate_to_block() {
    let f = fixture();
    let mut reports = Vec::new();
    for i in 0..5 {
        reports.push(
            f.stash
                .save_tabs(&format!("Burst {}", i), drafts(1), false)
                .await
                .unwrap(),
        );
    }

    assert_eq!(reports[2].throttle, Some(ThrottleDecision::Flagged));
    assert_eq!(reports[2].sync, SaveSync::Pushed(PushOutcome::Synced));
    assert_eq!(reports[4].sync, SaveSync::Blocked);
    assert_eq!(f.remote.group_count(), 4);
    assert_eq!(f.stash.records().list_groups().await.unwrap().len(), 5);
    assert!(f.remote.is_blocked("user-1"));
}

#[tokio::test]
async fn test_capacity_exceeded_after_local_save() {
    let f = fixture();
    f.remote.reject_groups_over_capacity(true);

    let report = f.stash.save_tabs("Too many", drafts(1), false).await.unwrap();
    assert!(matches!(report.sync, SaveSync::CapacityExceeded(_)));
    assert_eq!(f.stash.records().list_groups().await.unwrap().len(), 1);
    assert_eq!(f.stash.engine().queue().size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_rename_demotes_auto_save_and_pushes() {
    let f = fixture();
    let saved = f.stash.save_tabs("Auto", drafts(1), true).await.unwrap();

    let renamed = f.stash.rename_group(&saved.group.id, "Kept").await.unwrap();
    assert_eq!(renamed.group.name, "Kept");
    assert!(!renamed.group.is_auto_save);
    assert!(renamed.group.updated_at > saved.group.updated_at);
    assert_eq!(renamed.throttle, None);

    let row = f.remote.group(&saved.group.id).unwrap();
    assert!(!row.is_auto_save);

    let err = f.stash.rename_group("missing", "x").await.unwrap_err();
    assert!(matches!(err, TabStashError::NotFound(_)));
}

#[tokio::test]
async fn test_add_tabs_appends_and_pushes() {
    let f = fixture();
    let saved = f.stash.save_tabs("Grow", drafts(2), false).await.unwrap();

    let report = f
        .stash
        .add_tabs(&saved.group.id, vec![TabDraft::new("https://new.example", "New")])
        .await
        .unwrap();
    assert_eq!(report.group.tabs.len(), 3);
    assert_eq!(report.group.tabs[2].position, 2);
    assert_eq!(f.remote.tab_count(), 3);
}

#[tokio::test]
async fn test_delete_group_removes_locally_and_remotely() {
    let f = fixture();
    let saved = f.stash.save_tabs("Doomed", drafts(2), false).await.unwrap();

    let removed = f.stash.delete_group(&saved.group.id).await.unwrap();
    assert_eq!(removed.map(|g| g.id), Some(saved.group.id.clone()));
    assert!(f.stash.records().list_groups().await.unwrap().is_empty());
    assert_eq!(f.remote.group_count(), 0);
    assert_eq!(f.remote.tab_count(), 0);

    assert!(f.stash.delete_group(&saved.group.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_offline_delete_is_queued() {
    let f = fixture();
    let saved = f.stash.save_tabs("Later", drafts(1), false).await.unwrap();
    let tab_id = saved.group.tabs[0].id.clone();

    f.remote.set_offline(true);
    f.stash.delete_tab(&saved.group.id, &tab_id).await.unwrap();

    let items = f.stash.engine().queue().get_all().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].entity_type, EntityType::Tab);
    assert_eq!(items[0].entity_id, tab_id);
    assert!(f.remote.tab(&tab_id).is_some());

    f.remote.set_offline(false);
    f.stash.flush().await.unwrap();
    assert!(f.remote.tab(&tab_id).is_none());
}

#[tokio::test]
async fn test_delete_after_offline_save_stays_deleted() {
    let f = fixture();
    f.remote.set_offline(true);
    let saved = f.stash.save_tabs("Queued", drafts(2), false).await.unwrap();
    assert_eq!(saved.sync, SaveSync::Pushed(PushOutcome::GroupQueued));

    f.remote.set_offline(false);
    f.stash.delete_group(&saved.group.id).await.unwrap();
    assert_eq!(f.stash.engine().queue().size().await.unwrap(), 0);

    let flushed = f.stash.flush().await.unwrap();
    assert_eq!(flushed.succeeded, 0);
    assert_eq!(f.remote.group_count(), 0);
    assert_eq!(f.remote.tab_count(), 0);

    let LoadResult::Applied(groups) = f.stash.load_groups().await.unwrap() else {
        panic!("load should apply");
    };
    assert!(groups.is_empty());
}

#[tokio::test]
async fn test_rename_after_offline_save_survives_flush() {
    let f = fixture();
    f.remote.set_offline(true);
    let saved = f.stash.save_tabs("Draft", drafts(1), false).await.unwrap();

    f.remote.set_offline(false);
    f.stash.rename_group(&saved.group.id, "Final").await.unwrap();
    f.stash.flush().await.unwrap();

    let LoadResult::Applied(groups) = f.stash.load_groups().await.unwrap() else {
        panic!("load should apply");
    };
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "Final");
}

#[tokio::test]
async fn test_unreadable_name_is_not_overwritten_by_later_edits() {
    let f = fixture();
    let saved = f.stash.save_tabs("Secret plans", drafts(1), false).await.unwrap();
    let group_id = saved.group.id.clone();

    // Name written under a key this device cannot derive
    let foreign = derive_user_key(b"another-secret", "user-1").unwrap();
    let mut row = f.remote.group(&group_id).unwrap();
    row.name = encrypt_field("Secret plans", &foreign).unwrap();
    let unreadable = row.name.clone();
    f.remote.insert_raw(row);

    let LoadResult::Applied(groups) = f.stash.load_groups().await.unwrap() else {
        panic!("load should apply");
    };
    assert!(groups[0].partial);
    assert_eq!(groups[0].name, "");

    let report = f.stash.add_tabs(&group_id, drafts(1)).await.unwrap();
    assert_eq!(report.sync, SaveSync::Pushed(PushOutcome::Synced));
    assert_eq!(f.remote.group(&group_id).unwrap().name, unreadable);
    assert_eq!(f.remote.tab_count(), 2);

    f.stash.rename_group(&group_id, "Readable").await.unwrap();
    let key = derive_user_key(b"stash-test-secret", "user-1").unwrap();
    let renamed = f.remote.group(&group_id).unwrap();
    assert_eq!(decrypt_field(&renamed.name, &key).unwrap(), "Readable");
}

#[tokio::test]
async fn test_move_tab_updates_both_groups() {
    let f = fixture();
    let source = f.stash.save_tabs("Source", drafts(2), false).await.unwrap().group;
    let target = f.stash.save_tabs("Target", drafts(1), false).await.unwrap().group;
    let moved_id = source.tabs[0].id.clone();

    let (new_source, new_target) = f
        .stash
        .move_tab(&moved_id, &source.id, &target.id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(new_source.tabs.len(), 1);
    assert_eq!(new_target.tabs.len(), 2);
    assert_eq!(new_target.tabs[1].id, moved_id);
    assert_eq!(new_target.tabs[1].position, 1);

    let row = f.remote.tab(&moved_id).unwrap();
    assert_eq!(row.group_id, target.id);
    assert_eq!(row.position, 1);

    assert!(f
        .stash
        .move_tab(&moved_id, &target.id, &target.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_restore_group_respects_setting() {
    let f = fixture();
    let kept = f.stash.save_tabs("Kept", drafts(1), false).await.unwrap().group;

    let restored = f.stash.restore_group(&kept.id).await.unwrap();
    assert_eq!(restored.id, kept.id);
    assert_eq!(f.stash.records().list_groups().await.unwrap().len(), 1);

    let settings = Settings {
        restore_removes_group: true,
        ..Settings::default()
    };
    f.stash.update_settings(&settings).await.unwrap();

    f.stash.restore_group(&kept.id).await.unwrap();
    assert!(f.stash.records().list_groups().await.unwrap().is_empty());
    assert_eq!(f.remote.group_count(), 0);
}

#[tokio::test]
async fn test_load_replaces_local_view_with_remote_snapshot() {
    let f = fixture();
    let saved = f.stash.save_tabs("Everywhere", drafts(2), false).await.unwrap();

    // Another device's copy arrives through the remote store only
    let other = TabGroup::new("From laptop", drafts(1), false, "device-2");
    f.stash.engine().push_group(&other).await.unwrap();

    // Drop the local view to prove the load repopulates it
    f.stash.records().replace_all(&[]).await.unwrap();

    let LoadResult::Applied(groups) = f.stash.load_groups().await.unwrap() else {
        panic!("load should apply");
    };
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().any(|g| g.name == "From laptop"));
    assert!(groups.iter().any(|g| g == &saved.group));
    assert_eq!(f.stash.records().list_groups().await.unwrap(), groups);
}

#[tokio::test]
async fn test_load_falls_back_to_local_view() {
    let f = fixture();
    f.stash.save_tabs("Local copy", drafts(1), false).await.unwrap();

    f.remote.fail_fetch(true);
    let LoadResult::Applied(groups) = f.stash.load_groups().await.unwrap() else {
        panic!("load should apply");
    };
    assert_eq!(groups.len(), 1);

    f.sessions.sign_out();
    let LoadResult::Applied(groups) = f.stash.load_groups().await.unwrap() else {
        panic!("load should apply");
    };
    assert_eq!(groups[0].name, "Local copy");
}

#[tokio::test]
async fn test_overtaken_load_is_stale() {
    let f = fixture();
    f.stash.save_tabs("Current", drafts(1), false).await.unwrap();

    let (release, gate) = oneshot::channel();
    f.remote.gate_next_fetch(gate);

    let stash = &f.stash;
    let first = stash.load_groups();
    let second = async move {
        let result = stash.load_groups().await;
        let _ = release.send(());
        result
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap(), LoadResult::Stale);
    assert!(matches!(second.unwrap(), LoadResult::Applied(groups) if groups.len() == 1));
}

#[test]
fn test_load_guard_tickets() {
    let guard = LoadGuard::new();
    let first = guard.begin();
    assert!(guard.is_current(first));

    let second = guard.begin();
    assert!(!guard.is_current(first));
    assert!(guard.is_current(second));
}

#[tokio::test]
async fn test_sign_out_clears_cached_key() {
    let f = fixture();
    f.stash.save_tabs("Keyed", drafts(1), false).await.unwrap();
    let cache_key = crate::database::keys::encryption_key("user-1");
    assert!(f.store.get(&cache_key).await.unwrap().is_some());

    f.stash.sign_out().await.unwrap();
    assert!(f.store.get(&cache_key).await.unwrap().is_none());
}
