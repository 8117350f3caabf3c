use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{SettingsBackend, StoredSetting};
use crate::error::{BookmarkError, Result};

const NAME: &str = "content_repo";
const USER_AGENT: &str = "bookaimark-settings";

/// Settings committed to a version-controlled repository through the GitHub
/// contents API, one file per setting at `config/<key>/<user_id>.json`.
pub struct ContentRepoBackend {
    client: Client,
    api_url: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ContentFile {
    content: String,
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContent<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

impl ContentRepoBackend {
    pub fn new(
        client: Client,
        api_url: &str,
        owner: &str,
        repo: &str,
        branch: &str,
        token: &str,
    ) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            token: token.to_string(),
        }
    }

    pub fn file_path(user_id: &str, key: &str) -> String {
        format!("config/{key}/{user_id}.json")
    }

    fn contents_url(&self, user_id: &str, key: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url,
            self.owner,
            self.repo,
            Self::file_path(user_id, key)
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
    }

    async fn fetch(&self, user_id: &str, key: &str) -> Result<Option<ContentFile>> {
        let url = self.contents_url(user_id, key);
        let response = self
            .request(reqwest::Method::GET, &url)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(BookmarkError::backend(NAME, format!("status {status}"))),
        }
    }
}

#[async_trait]
impl SettingsBackend for ContentRepoBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn read(&self, user_id: &str, key: &str) -> Result<Option<StoredSetting>> {
        let Some(file) = self.fetch(user_id, key).await? else {
            return Ok(None);
        };
        // The API wraps base64 at 60 columns.
        let compact: String = file.content.split_whitespace().collect();
        let bytes = BASE64
            .decode(compact)
            .map_err(|err| BookmarkError::backend(NAME, format!("invalid base64: {err}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|err| BookmarkError::backend(NAME, format!("invalid utf-8: {err}")))?;
        Ok(Some(StoredSetting::from_json_str(&text)?))
    }

    async fn write(&self, user_id: &str, key: &str, setting: &StoredSetting) -> Result<()> {
        let existing_sha = self.fetch(user_id, key).await?.map(|file| file.sha);
        let body = PutContent {
            message: format!("Update setting {key} for {user_id}"),
            content: BASE64.encode(serde_json::to_string_pretty(setting)?),
            branch: &self.branch,
            sha: existing_sha,
        };

        let url = self.contents_url(user_id, key);
        let response = self
            .request(reqwest::Method::PUT, &url)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BookmarkError::backend(
                NAME,
                format!("status {}", response.status()),
            ));
        }
        Ok(())
    }
}
