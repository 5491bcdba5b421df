//! HTTP client for a PostgREST-style remote record store.

use crate::sync::models::{AbuseEventRow, DeviceRow, GroupRow, TabRow};
use crate::sync::remote::{RemoteError, RemoteResult, RemoteStore};
use crate::sync::session::SessionProvider;
use crate::{Result, TabStashError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const GROUPS_TABLE: &str = "tab_groups";
const TABS_TABLE: &str = "saved_tabs";
const DEVICES_TABLE: &str = "devices";
const PROFILES_TABLE: &str = "profiles";
const ABUSE_TABLE: &str = "abuse_flags";

/// HTTP implementation of [`RemoteStore`].
///
/// Requests carry the project API key plus the current session's bearer
/// token (falling back to the API key when signed out).
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    sessions: Arc<dyn SessionProvider>,
}

impl HttpRemoteStore {
    /// Create a new client.
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
        sessions: Arc<dyn SessionProvider>,
    ) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(TabStashError::Config(
                "remote store URL is not configured".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TabStashError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            sessions,
        })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn function_url(&self, function: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, function)
    }

    // --- Internal helpers ---

    async fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self
            .sessions
            .get_session()
            .await
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.api_key.clone());

        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", token))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> RemoteResult<reqwest::Response> {
        let resp = self
            .authorized(request)
            .await
            .send()
            .await
            .map_err(|e| RemoteError::new(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(RemoteError::with_status(status.as_u16(), body));
        }

        Ok(resp)
    }

    async fn upsert<T: serde::Serialize + Sync>(&self, table: &str, row: &T) -> RemoteResult<()> {
        let request = self
            .client
            .post(self.rest_url(table))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row]);

        self.send(request).await?;
        Ok(())
    }

    async fn delete_by_id(&self, table: &str, id: &str) -> RemoteResult<()> {
        let request = self
            .client
            .delete(self.rest_url(table))
            .query(&[("id", format!("eq.{}", id))]);

        self.send(request).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct ProfileFlag {
    #[serde(default)]
    is_blocked: bool,
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn upsert_device(&self, device: &DeviceRow) -> RemoteResult<()> {
        self.upsert(DEVICES_TABLE, device).await
    }

    async fn upsert_group(&self, group: &GroupRow) -> RemoteResult<()> {
        self.upsert(GROUPS_TABLE, group).await
    }

    async fn upsert_tab(&self, tab: &TabRow) -> RemoteResult<()> {
        self.upsert(TABS_TABLE, tab).await
    }

    async fn delete_group(&self, group_id: &str) -> RemoteResult<()> {
        self.delete_by_id(GROUPS_TABLE, group_id).await
    }

    async fn delete_tab(&self, tab_id: &str) -> RemoteResult<()> {
        self.delete_by_id(TABS_TABLE, tab_id).await
    }

    async fn fetch_groups(&self, user_id: &str) -> RemoteResult<Vec<GroupRow>> {
        let request = self.client.get(self.rest_url(GROUPS_TABLE)).query(&[
            ("select", "*,saved_tabs(*)".to_string()),
            ("user_id", format!("eq.{}", user_id)),
            ("order", "created_at.desc".to_string()),
        ]);

        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::new(format!("Invalid tab_groups response: {}", e)))
    }

    async fn is_user_blocked(&self, user_id: &str) -> RemoteResult<bool> {
        let request = self.client.get(self.rest_url(PROFILES_TABLE)).query(&[
            ("select", "is_blocked".to_string()),
            ("id", format!("eq.{}", user_id)),
        ]);

        let rows: Vec<ProfileFlag> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::new(format!("Invalid profiles response: {}", e)))?;

        Ok(rows.first().map(|p| p.is_blocked).unwrap_or(false))
    }

    async fn block_user(&self, user_id: &str) -> RemoteResult<()> {
        let request = self
            .client
            .patch(self.rest_url(PROFILES_TABLE))
            .query(&[("id", format!("eq.{}", user_id))])
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({
                "is_blocked": true,
                "blocked_at": chrono::Utc::now(),
            }));

        self.send(request).await?;
        Ok(())
    }

    async fn insert_abuse_event(&self, event: &AbuseEventRow) -> RemoteResult<()> {
        let request = self
            .client
            .post(self.rest_url(ABUSE_TABLE))
            .header("Prefer", "return=minimal")
            .json(event);

        self.send(request).await?;
        Ok(())
    }

    async fn invoke(&self, function: &str, payload: Value) -> RemoteResult<Value> {
        let request = self.client.post(self.function_url(function)).json(&payload);
        let bytes = self
            .send(request)
            .await?
            .bytes()
            .await
            .map_err(|e| RemoteError::new(e.to_string()))?;

        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| RemoteError::new(format!("Invalid {} response: {}", function, e)))
    }
}
