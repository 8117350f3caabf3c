use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{SettingsBackend, StoredSetting};
use crate::error::{BookmarkError, Result};

const NAME: &str = "remote_table";

/// Settings rows in the remote database, reached through its REST gateway
/// (`{url}/rest/v1/{table}`).
///
/// Rows are `(user_id, setting_key, setting_value, updated_at)` with a unique
/// constraint on `(user_id, setting_key)`; writes are upserts.
pub struct RemoteTableBackend {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
}

#[derive(Debug, Deserialize)]
struct SettingRow {
    setting_value: Value,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct UpsertRow<'a> {
    user_id: &'a str,
    setting_key: &'a str,
    setting_value: &'a Value,
    updated_at: DateTime<Utc>,
}

impl RemoteTableBackend {
    pub fn new(client: Client, base_url: &str, api_key: &str, table: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            table: table.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }
}

#[async_trait]
impl SettingsBackend for RemoteTableBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn read(&self, user_id: &str, key: &str) -> Result<Option<StoredSetting>> {
        let user_filter = format!("eq.{user_id}");
        let key_filter = format!("eq.{key}");
        let response = self
            .authorized(self.client.get(self.endpoint()))
            .header("Accept", "application/json")
            .query(&[
                ("select", "setting_value,updated_at"),
                ("user_id", user_filter.as_str()),
                ("setting_key", key_filter.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), response.text().await.ok()));
        }

        let rows: Vec<SettingRow> = response.json().await?;
        Ok(rows.into_iter().next().map(|row| StoredSetting {
            value: row.setting_value,
            updated_at: row.updated_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        }))
    }

    async fn write(&self, user_id: &str, key: &str, setting: &StoredSetting) -> Result<()> {
        let row = UpsertRow {
            user_id,
            setting_key: key,
            setting_value: &setting.value,
            updated_at: setting.updated_at,
        };
        let response = self
            .authorized(self.client.post(self.endpoint()))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query(&[("on_conflict", "user_id,setting_key")])
            .json(&[row])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), response.text().await.ok()));
        }
        Ok(())
    }
}

fn status_error(status: StatusCode, body: Option<String>) -> BookmarkError {
    let detail = body
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| "no response body".to_string());
    BookmarkError::backend(NAME, format!("status {status}: {detail}"))
}
