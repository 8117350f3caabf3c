//! # Configuration
//!
//! Configuration is managed by [`confique`], which handles layered loading from
//! environment variables, a TOML file, and compiled defaults.
//!
//! ## Resolution Order
//!
//! 1. **Environment variables**: `BOOKAIMARK_DATA_DIR`, `SUPABASE_URL`, `GITHUB_TOKEN`, ...
//! 2. **Config file**: the path given with `--config`, else `bookaimark.toml` in the
//!    working directory (skipped when absent).
//! 3. **Compiled defaults**: `#[config(default = ...)]`.
//!
//! ## Settings Backends
//!
//! The remote table backend is enabled when both `remote.url` and
//! `remote.api_key` are set; the content repository backend when `repo.owner`,
//! `repo.name` and `repo.token` are set; the local file backend when
//! `local_file_fallback` is true.
//!
//! `bookaimark config` prints a commented template of every key. Serializing a
//! config masks secrets (`remote.api_key`, `repo.token` and the token half of
//! each `session_tokens` entry), so the effective config can be printed safely.

use confique::Config;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::ratelimit::Algorithm;

pub const DEFAULT_CONFIG_FILE: &str = "bookaimark.toml";
const REDACTED: &str = "<redacted>";

#[derive(Config, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BookmarkConfig {
    /// Directory holding the entity JSON files.
    #[config(env = "BOOKAIMARK_DATA_DIR", default = "data")]
    pub data_dir: PathBuf,

    /// Serverless deployments keep data under the system temp directory.
    #[config(env = "BOOKAIMARK_SERVERLESS", default = false)]
    pub serverless: bool,

    /// Keep a settings replica in `<data_dir>/settings/`.
    #[config(env = "BOOKAIMARK_LOCAL_FILE_FALLBACK", default = true)]
    pub local_file_fallback: bool,

    /// Substitute the fixed development identity when no session is present.
    #[config(env = "BOOKAIMARK_DEV_FALLBACK", default = true)]
    pub dev_fallback: bool,

    /// Session bearer tokens as `token:user_id` pairs.
    #[config(
        env = "BOOKAIMARK_SESSION_TOKENS",
        parse_env = confique::env::parse::list_by_comma,
        default = []
    )]
    #[serde(serialize_with = "redact_sessions")]
    pub session_tokens: Vec<String>,

    /// Timeout for calls to remote settings backends, in seconds.
    #[config(env = "BOOKAIMARK_HTTP_TIMEOUT_SECS", default = 10)]
    pub http_timeout_secs: u64,

    #[config(nested)]
    pub remote: RemoteTableConfig,

    #[config(nested)]
    pub repo: ContentRepoConfig,

    #[config(nested)]
    pub limits: LimitsConfig,

    #[config(nested)]
    pub cache: CacheConfig,
}

#[derive(Config, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteTableConfig {
    /// Base URL of the remote database REST endpoint.
    #[config(env = "SUPABASE_URL")]
    pub url: Option<String>,

    #[config(env = "SUPABASE_SERVICE_ROLE_KEY")]
    #[serde(serialize_with = "redact")]
    pub api_key: Option<String>,

    #[config(env = "BOOKAIMARK_SETTINGS_TABLE", default = "user_settings")]
    pub table: String,
}

#[derive(Config, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ContentRepoConfig {
    #[config(env = "GITHUB_OWNER")]
    pub owner: Option<String>,

    #[config(env = "GITHUB_REPO")]
    pub name: Option<String>,

    #[config(env = "GITHUB_BRANCH", default = "main")]
    pub branch: String,

    #[config(env = "GITHUB_TOKEN")]
    #[serde(serialize_with = "redact")]
    pub token: Option<String>,

    /// Base URL of the contents API.
    #[config(env = "GITHUB_API_URL", default = "https://api.github.com")]
    pub api_url: String,
}

#[derive(Config, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LimitsConfig {
    /// Read requests allowed per window and client; 0 disables the limit.
    #[config(env = "BOOKAIMARK_RATE_LIMIT_READS", default = 120)]
    pub read_requests: u32,

    /// Write requests allowed per window and client; 0 disables the limit.
    #[config(env = "BOOKAIMARK_RATE_LIMIT_WRITES", default = 30)]
    pub write_requests: u32,

    #[config(env = "BOOKAIMARK_RATE_LIMIT_WINDOW_SECS", default = 60)]
    pub window_secs: u64,

    /// Key clients by `X-Forwarded-For`/`X-Real-IP`. Only enable behind a proxy
    /// that overwrites them; otherwise the socket peer is used.
    #[config(env = "BOOKAIMARK_TRUST_PROXY_HEADERS", default = false)]
    pub trust_proxy_headers: bool,

    /// `fixed_window`, `sliding_window` or `token_bucket`.
    #[config(env = "BOOKAIMARK_RATE_LIMIT_ALGORITHM", default = "fixed_window")]
    pub algorithm: Algorithm,
}

#[derive(Config, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    #[config(env = "BOOKAIMARK_CACHE_TTL_SECS", default = 60)]
    pub ttl_secs: u64,

    #[config(env = "BOOKAIMARK_CACHE_MAX_ENTRIES", default = 1024)]
    pub max_entries: usize,

    /// Store cached bodies gzip-compressed.
    #[config(env = "BOOKAIMARK_CACHE_COMPRESSION", default = false)]
    pub compression: bool,
}

impl Default for BookmarkConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            serverless: false,
            local_file_fallback: true,
            dev_fallback: true,
            session_tokens: Vec::new(),
            http_timeout_secs: 10,
            remote: RemoteTableConfig {
                url: None,
                api_key: None,
                table: "user_settings".to_string(),
            },
            repo: ContentRepoConfig {
                owner: None,
                name: None,
                branch: "main".to_string(),
                token: None,
                api_url: "https://api.github.com".to_string(),
            },
            limits: LimitsConfig {
                read_requests: 120,
                write_requests: 30,
                window_secs: 60,
                trust_proxy_headers: false,
                algorithm: Algorithm::FixedWindow,
            },
            cache: CacheConfig {
                ttl_secs: 60,
                max_entries: 1024,
                compression: false,
            },
        }
    }
}

impl BookmarkConfig {
    /// Load from env, then `path` (or `bookaimark.toml`), then defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let config = Self::builder().env().file(file).load()?;
        Ok(config)
    }

    /// Commented TOML template listing every key.
    pub fn template() -> String {
        confique::toml::template::<Self>(confique::toml::FormatOptions::default())
    }

    /// The directory entity files actually live in.
    pub fn resolved_data_dir(&self) -> PathBuf {
        if self.serverless {
            std::env::temp_dir().join("bookaimark")
        } else {
            self.data_dir.clone()
        }
    }

    /// Session tokens mapped to user ids. Malformed entries are skipped.
    pub fn sessions(&self) -> HashMap<String, String> {
        self.session_tokens
            .iter()
            .filter_map(|entry| {
                let (token, user) = entry.split_once(':')?;
                let (token, user) = (token.trim(), user.trim());
                if token.is_empty() || user.is_empty() {
                    return None;
                }
                Some((token.to_string(), user.to_string()))
            })
            .collect()
    }
}

fn redact<S: Serializer>(
    secret: &Option<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    secret.as_ref().map(|_| REDACTED).serialize(serializer)
}

fn redact_sessions<S: Serializer>(
    entries: &[String],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    entries
        .iter()
        .map(|entry| match entry.split_once(':') {
            Some((_, user)) => format!("{REDACTED}:{user}"),
            None => REDACTED.to_string(),
        })
        .collect::<Vec<_>>()
        .serialize(serializer)
}
