//! Conversion between domain records and encrypted remote rows.
//!
//! Encrypted columns: group `name`; tab `url`, `title`, `favicon_url`.
//! Ids, positions, flags and timestamps stay in the clear so the remote
//! store can key, order and enforce capacity on them.

use crate::crypto::{
    decrypt_field, decrypt_optional, encrypt_field, encrypt_optional, CryptoResult, EncryptionKey,
};
use crate::database::{SavedTab, TabGroup};
use crate::sync::models::{GroupRow, PulledGroup, PulledTab, TabRow};
use tracing::warn;

/// Encrypt a group into its remote row (tabs are pushed separately).
pub fn encrypt_group_row(
    group: &TabGroup,
    user_id: &str,
    key: &EncryptionKey,
) -> CryptoResult<GroupRow> {
    Ok(GroupRow {
        id: group.id.clone(),
        user_id: user_id.to_string(),
        device_id: group.device_id.clone(),
        name: encrypt_field(&group.name, key)?,
        is_auto_save: group.is_auto_save,
        created_at: group.created_at,
        updated_at: group.updated_at,
        saved_tabs: Vec::new(),
    })
}

/// Encrypt a tab into its remote row.
pub fn encrypt_tab_row(
    group_id: &str,
    tab: &SavedTab,
    user_id: &str,
    key: &EncryptionKey,
) -> CryptoResult<TabRow> {
    Ok(TabRow {
        id: tab.id.clone(),
        group_id: group_id.to_string(),
        user_id: user_id.to_string(),
        url: encrypt_field(&tab.url, key)?,
        title: encrypt_field(&tab.title, key)?,
        favicon_url: encrypt_optional(tab.favicon_url.as_deref(), key)?,
        position: tab.position,
        created_at: tab.created_at,
    })
}

/// Decrypt a fetched group row and its nested tabs.
///
/// Each field is decrypted on its own: a field that fails comes back as
/// `None` and the rest of the record is still returned. Tabs are sorted by
/// position.
pub fn decrypt_group_row(row: GroupRow, key: &EncryptionKey) -> PulledGroup {
    let name = recover_field(&row.id, "name", decrypt_field(&row.name, key));

    let mut tabs: Vec<PulledTab> = row
        .saved_tabs
        .into_iter()
        .map(|tab| decrypt_tab_row(tab, key))
        .collect();
    tabs.sort_by_key(|t| t.position);

    PulledGroup {
        id: row.id,
        name,
        tabs,
        is_auto_save: row.is_auto_save,
        device_id: row.device_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn decrypt_tab_row(row: TabRow, key: &EncryptionKey) -> PulledTab {
    let url = recover_field(&row.id, "url", decrypt_field(&row.url, key));
    let title = recover_field(&row.id, "title", decrypt_field(&row.title, key));
    let favicon = recover_field(
        &row.id,
        "favicon_url",
        decrypt_optional(row.favicon_url.as_deref(), key),
    );

    PulledTab {
        id: row.id,
        url,
        title,
        favicon_unreadable: favicon.is_none(),
        favicon_url: favicon.flatten(),
        position: row.position,
        created_at: row.created_at,
    }
}

fn recover_field<T>(record_id: &str, field: &str, result: CryptoResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(record_id, field, error = %e, "Dropping field that failed to decrypt");
            None
        }
    }
}
