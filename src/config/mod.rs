// src/config/mod.rs
//! Service configuration.
//!
//! Lookup order:
//! 1) `$DIGEST_CONFIG_PATH`
//! 2) `config/digest.toml`
//! 3) `config/digest.json`
//! 4) built-in defaults
//!
//! `DIGEST_TIMEZONE`, `DIGEST_INGEST_CONCURRENCY` and `DIGEST_FETCH_TIMEOUT_MS`
//! override whatever the file says.

pub mod generation;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dedupe::content_hash;
use crate::digest::DigestSettings;
use crate::ingest::PoolSettings;
use crate::models::{Source, WindowDays};
use crate::ranking::Role;
use crate::timezone::parse_timezone;
pub use generation::GenerationConfig;

pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";
pub const ENV_TIMEZONE: &str = "DIGEST_TIMEZONE";
pub const ENV_INGEST_CONCURRENCY: &str = "DIGEST_INGEST_CONCURRENCY";
pub const ENV_FETCH_TIMEOUT_MS: &str = "DIGEST_FETCH_TIMEOUT_MS";
pub const DEFAULT_TOML_PATH: &str = "config/digest.toml";
pub const DEFAULT_JSON_PATH: &str = "config/digest.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {message}")]
    Parse { path: String, message: String },
    #[error("DIGEST_CONFIG_PATH points to non-existent path {0}")]
    MissingFile(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("missing api key: set {0}")]
    MissingApiKey(String),
}

fn default_timezone() -> String {
    "UTC".into()
}
fn default_window_days() -> u8 {
    1
}
fn default_concurrency() -> usize {
    4
}
fn default_fetch_timeout_ms() -> u64 {
    10_000
}
fn default_source_interval_ms() -> u64 {
    900_000
}
fn default_cache_ttl_ms() -> u64 {
    3_600_000
}
fn default_role() -> String {
    "general".into()
}
fn default_limit() -> usize {
    30
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub feed_url: String,
    pub display_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SourceConfig {
    /// Configured id, or one derived from the feed url so it is stable
    /// across restarts.
    pub fn to_source(&self) -> Source {
        let id = match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("src-{}", &content_hash(&self.feed_url)[..12]),
        };
        Source {
            id,
            feed_url: self.feed_url.trim().to_string(),
            display_name: self.display_name.trim().to_string(),
            enabled: self.enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_window_days")]
    pub default_window_days: u8,
    #[serde(default = "default_concurrency")]
    pub ingest_concurrency: usize,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_source_interval_ms")]
    pub source_interval_ms: u64,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// 0 disables the background ingest scheduler.
    #[serde(default)]
    pub scheduler_interval_secs: u64,
    #[serde(default = "default_role")]
    pub default_role: String,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            default_window_days: default_window_days(),
            ingest_concurrency: default_concurrency(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            source_interval_ms: default_source_interval_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
            scheduler_interval_secs: 0,
            default_role: default_role(),
            default_limit: default_limit(),
            sources: Vec::new(),
            generation: GenerationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from an explicit path. `.json` is parsed as JSON, anything else as TOML.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            serde_json::from_str::<AppConfig>(&content).map_err(|e| e.to_string())
        } else {
            toml::from_str::<AppConfig>(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    /// Resolve the file per the lookup order, apply env overrides, validate.
    pub fn load_default() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(&p);
                if !pb.exists() {
                    return Err(ConfigError::MissingFile(p));
                }
                Self::load_from(&pb)?
            }
            Err(_) => {
                let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
                let json_p = PathBuf::from(DEFAULT_JSON_PATH);
                if toml_p.exists() {
                    Self::load_from(&toml_p)?
                } else if json_p.exists() {
                    Self::load_from(&json_p)?
                } else {
                    tracing::info!(target: "api", "no config file found, using defaults");
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(tz) = std::env::var(ENV_TIMEZONE) {
            if !tz.trim().is_empty() {
                self.timezone = tz.trim().to_string();
            }
        }
        if let Some(n) = parse_env_number(ENV_INGEST_CONCURRENCY)? {
            self.ingest_concurrency = n as usize;
        }
        if let Some(ms) = parse_env_number(ENV_FETCH_TIMEOUT_MS)? {
            self.fetch_timeout_ms = ms;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_timezone(&self.timezone).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.window_days()?;
        self.role()?;
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_ms must be > 0".into()));
        }
        if !(1..=crate::ranking::MAX_LIMIT).contains(&self.default_limit) {
            return Err(ConfigError::Invalid("default_limit must be in 1..=100".into()));
        }
        if self.sources.iter().any(|s| s.feed_url.trim().is_empty()) {
            return Err(ConfigError::Invalid("every source needs a feed_url".into()));
        }
        if self.cache_ttl_ms < self.source_interval_ms {
            tracing::warn!(
                target: "ingest",
                cache_ttl_ms = self.cache_ttl_ms,
                source_interval_ms = self.source_interval_ms,
                "cache TTL is shorter than the source interval; entries expire before they go stale"
            );
        }
        Ok(())
    }

    pub fn window_days(&self) -> Result<WindowDays, ConfigError> {
        WindowDays::try_from(self.default_window_days).map_err(ConfigError::Invalid)
    }

    pub fn role(&self) -> Result<Role, ConfigError> {
        self.default_role.parse().map_err(ConfigError::Invalid)
    }

    pub fn sources(&self) -> Vec<Source> {
        self.sources.iter().map(SourceConfig::to_source).collect()
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            source_interval_ms: self.source_interval_ms,
            cache_ttl_ms: self.cache_ttl_ms,
        }
    }

    pub fn digest_settings(&self) -> Result<DigestSettings, ConfigError> {
        Ok(DigestSettings {
            timezone: self.timezone.clone(),
            default_window: self.window_days()?,
            default_role: self.role()?,
            default_limit: self.default_limit,
            ingest_concurrency: self.ingest_concurrency,
        })
    }
}

fn parse_env_number(key: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{key} must be a non-negative integer"))),
        _ => Ok(None),
    }
}
