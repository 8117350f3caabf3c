//! # Settings Tri-Store
//!
//! Per-user settings (`(user_id, key) → JSON value`) replicated across several
//! backends so a setting stays readable and writable when the primary database
//! is unreachable.
//!
//! ## Backends, in priority order
//!
//! 1. [`remote_table::RemoteTableBackend`]: row in the remote database.
//! 2. [`content_repo::ContentRepoBackend`]: `config/<key>/<user_id>.json` in a repository.
//! 3. [`local_file::LocalFileBackend`]: `settings/<user_id>/<key>.json` on local disk.
//! 4. [`mirror::MirrorBackend`]: in-process copy, consulted last.
//!
//! Backends 1–3 are optional and only present when configured.
//!
//! ## Reads: source of truth with replicas
//!
//! The first persistent backend is authoritative. When it returns a value, that
//! value wins without consulting anything else. When it misses or fails, the
//! remaining persistent backends are queried together and the value with the
//! newest `updated_at` wins. The mirror is the last resort, then the caller's
//! default. Whatever a persistent backend returns is copied into the mirror.
//!
//! ## Writes: fan-out
//!
//! All backends are written concurrently. A failure never stops the others;
//! every failure is recorded in the [`WriteReport`]. The write succeeds when at
//! least one persistent backend accepted it (or, with no persistent backend
//! configured, when the mirror did), and fails with
//! [`BookmarkError::AllBackendsFailed`] otherwise.
//!
//! Backends are not transactionally coordinated: after a partial failure they
//! disagree until the next successful write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::BookmarkConfig;
use crate::error::{BookmarkError, Result};
use crate::store::FsBackend;

pub mod content_repo;
pub mod local_file;
pub mod mirror;
pub mod remote_table;

use content_repo::ContentRepoBackend;
use local_file::LocalFileBackend;
use mirror::MirrorBackend;
use remote_table::RemoteTableBackend;

const MAX_SEGMENT_LEN: usize = 128;

/// A setting value as persisted by every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSetting {
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

impl StoredSetting {
    pub fn now(value: Value) -> Self {
        Self {
            value,
            updated_at: Utc::now(),
        }
    }

    /// Parse a stored document. Documents written before values carried a
    /// timestamp hold the bare value; those date from the epoch.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(text)?;
        let is_envelope = raw
            .as_object()
            .is_some_and(|obj| obj.contains_key("value") && obj.contains_key("updated_at"));
        if is_envelope {
            if let Ok(setting) = serde_json::from_value::<StoredSetting>(raw.clone()) {
                return Ok(setting);
            }
        }
        Ok(Self {
            value: raw,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        })
    }
}

#[async_trait]
pub trait SettingsBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn read(&self, user_id: &str, key: &str) -> Result<Option<StoredSetting>>;

    async fn write(&self, user_id: &str, key: &str, setting: &StoredSetting) -> Result<()>;
}

/// Result of a read: the value and the backend it came from (`None` for the default).
#[derive(Debug, Clone, PartialEq)]
pub struct SettingRead {
    pub value: Value,
    pub source: Option<&'static str>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteReport {
    pub succeeded: Vec<&'static str>,
    pub failed: Vec<BackendFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendFailure {
    pub backend: &'static str,
    pub error: String,
}

pub struct TriStore {
    persistent: Vec<Arc<dyn SettingsBackend>>,
    mirror: Arc<MirrorBackend>,
}

impl TriStore {
    /// Build from persistent backends in priority order.
    pub fn new(persistent: Vec<Arc<dyn SettingsBackend>>) -> Self {
        Self {
            persistent,
            mirror: Arc::new(MirrorBackend::new()),
        }
    }

    /// Wire up every backend the configuration enables.
    pub fn from_config(config: &BookmarkConfig, local: Arc<FsBackend>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs.max(1)))
            .build()?;
        let mut persistent: Vec<Arc<dyn SettingsBackend>> = Vec::new();

        if let (Some(url), Some(api_key)) = (&config.remote.url, &config.remote.api_key) {
            persistent.push(Arc::new(RemoteTableBackend::new(
                client.clone(),
                url,
                api_key,
                &config.remote.table,
            )));
        }

        let repo = &config.repo;
        if let (Some(owner), Some(name), Some(token)) = (&repo.owner, &repo.name, &repo.token) {
            persistent.push(Arc::new(ContentRepoBackend::new(
                client,
                &repo.api_url,
                owner,
                name,
                &repo.branch,
                token,
            )));
        }

        if config.local_file_fallback {
            persistent.push(Arc::new(LocalFileBackend::new(local)));
        }

        let names: Vec<&str> = persistent.iter().map(|b| b.name()).collect();
        tracing::info!(backends = ?names, "settings store ready");
        Ok(Self::new(persistent))
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.persistent
            .iter()
            .map(|b| b.name())
            .chain(std::iter::once(self.mirror.name()))
            .collect()
    }

    pub fn mirror(&self) -> &MirrorBackend {
        &self.mirror
    }

    pub async fn read(&self, user_id: &str, key: &str, default: Value) -> Result<SettingRead> {
        validate_segment("user_id", user_id)?;
        validate_segment("key", key)?;

        if let Some((primary, replicas)) = self.persistent.split_first() {
            match primary.read(user_id, key).await {
                Ok(Some(setting)) => return Ok(self.found(user_id, key, primary.name(), setting)),
                Ok(None) => tracing::debug!(backend = primary.name(), key, "setting not found"),
                Err(err) => {
                    tracing::warn!(backend = primary.name(), key, error = %err, "setting read failed")
                }
            }

            let results = join_all(replicas.iter().map(|backend| async move {
                (backend.name(), backend.read(user_id, key).await)
            }))
            .await;

            let newest = results
                .into_iter()
                .filter_map(|(name, result)| match result {
                    Ok(found) => found.map(|setting| (name, setting)),
                    Err(err) => {
                        tracing::warn!(backend = name, key, error = %err, "setting read failed");
                        None
                    }
                })
                .max_by_key(|(_, setting)| setting.updated_at);

            if let Some((name, setting)) = newest {
                return Ok(self.found(user_id, key, name, setting));
            }
        }

        if let Some(setting) = self.mirror.get(user_id, key) {
            return Ok(SettingRead {
                value: setting.value,
                source: Some(self.mirror.name()),
            });
        }

        Ok(SettingRead {
            value: default,
            source: None,
        })
    }

    pub async fn write(&self, user_id: &str, key: &str, value: Value) -> Result<WriteReport> {
        validate_segment("user_id", user_id)?;
        validate_segment("key", key)?;

        let setting = StoredSetting::now(value);
        let setting = &setting;
        let results = join_all(self.persistent.iter().map(|backend| async move {
            (backend.name(), backend.write(user_id, key, setting).await)
        }))
        .await;

        let mut report = WriteReport::default();
        for (backend, result) in results {
            match result {
                Ok(()) => report.succeeded.push(backend),
                Err(err) => report.failed.push(BackendFailure {
                    backend,
                    error: err.to_string(),
                }),
            }
        }

        if self.persistent.is_empty() || !report.succeeded.is_empty() {
            self.mirror.put(user_id, key, setting.clone());
            report.succeeded.push(self.mirror.name());
        }

        if report.succeeded.is_empty() {
            let messages = report
                .failed
                .iter()
                .map(|f| format!("{}: {}", f.backend, f.error))
                .collect::<Vec<_>>();
            tracing::error!(key, user_id, errors = ?messages, "setting write failed everywhere");
            return Err(BookmarkError::AllBackendsFailed(messages));
        }

        if !report.failed.is_empty() {
            tracing::warn!(
                key,
                user_id,
                succeeded = ?report.succeeded,
                failed = ?report.failed,
                "setting written with partial failures"
            );
        }
        Ok(report)
    }

    fn found(
        &self,
        user_id: &str,
        key: &str,
        source: &'static str,
        setting: StoredSetting,
    ) -> SettingRead {
        self.mirror.put(user_id, key, setting.clone());
        SettingRead {
            value: setting.value,
            source: Some(source),
        }
    }
}

/// User ids and keys become path segments in two backends; keep them plain.
pub fn validate_segment(field: &str, value: &str) -> Result<()> {
    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if value.is_empty()
        || value.len() > MAX_SEGMENT_LEN
        || value.starts_with('.')
        || !valid_chars
    {
        return Err(BookmarkError::Validation(format!("Invalid {field}")));
    }
    Ok(())
}
