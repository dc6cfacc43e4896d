//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFCACHE_*)
//! 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFCACHE_*)
/// 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via OFFCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for origin requests.
    ///
    /// Set via OFFCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum response body size in bytes.
    ///
    /// Set via OFFCACHE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Origin request timeout in milliseconds.
    ///
    /// Set via OFFCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects followed per request.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Base URL of the origin. Manifest paths and `/`-rooted request URLs
    /// resolve against it.
    ///
    /// Set via OFFCACHE_ORIGIN environment variable.
    #[serde(default)]
    pub origin: Option<String>,

    /// Name of the cache generation this build installs.
    ///
    /// Set via OFFCACHE_GENERATION environment variable.
    #[serde(default = "default_generation")]
    pub generation: String,

    /// Paths that must be cached before a generation counts as installed.
    #[serde(default)]
    pub manifest: Vec<String>,

    /// Concurrent manifest fetches during installation.
    #[serde(default = "default_install_concurrency")]
    pub install_concurrency: usize,

    /// Activate a freshly installed generation without waiting for an
    /// explicit activation call.
    #[serde(default = "default_true")]
    pub auto_activate: bool,

    /// Store successful network-first responses so they survive going offline.
    #[serde(default = "default_true")]
    pub cache_network_first: bool,

    /// Route classification rules.
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Path patterns feeding the route classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Dynamic-data namespaces that are never cached.
    #[serde(default = "default_network_only_prefixes")]
    pub network_only_prefixes: Vec<String>,

    /// User-content namespaces served cache-first.
    #[serde(default = "default_cache_first_prefixes")]
    pub cache_first_prefixes: Vec<String>,

    /// File extensions served cache-first wherever they appear.
    #[serde(default = "default_cache_first_extensions")]
    pub cache_first_extensions: Vec<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offcache.sqlite")
}

fn default_user_agent() -> String {
    "offcache/0.1".into()
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_generation() -> String {
    "offcache-v1".into()
}

fn default_install_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_network_only_prefixes() -> Vec<String> {
    vec!["/api".into()]
}

fn default_cache_first_prefixes() -> Vec<String> {
    vec!["/uploads".into()]
}

fn default_cache_first_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "avif", "bmp"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            network_only_prefixes: default_network_only_prefixes(),
            cache_first_prefixes: default_cache_first_prefixes(),
            cache_first_extensions: default_cache_first_extensions(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            origin: None,
            generation: default_generation(),
            manifest: Vec::new(),
            install_concurrency: default_install_concurrency(),
            auto_activate: true,
            cache_network_first: true,
            policy: PolicyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFCACHE_`
    /// 2. TOML file from `OFFCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OFFCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        Self::extract(figment.merge(
            Env::prefixed("OFFCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        ))
    }

    /// Load configuration from an explicit TOML string layered over defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::extract(Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(toml)))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Parsed origin URL, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin does not parse.
    pub fn origin_url(&self) -> Result<Option<url::Url>, ConfigError> {
        self.origin
            .as_deref()
            .map(|origin| {
                url::Url::parse(origin)
                    .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
            })
            .transpose()
    }
}
