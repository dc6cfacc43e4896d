//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 100MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` or `generation` is empty
    /// - `install_concurrency` is outside 1..=32
    /// - `origin` does not parse as an http(s) URL
    /// - a policy prefix does not start with `/`
    ///
    /// Returns `ConfigError::Missing` if a manifest is set without an origin.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 100 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 100MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.generation.trim().is_empty() {
            return Err(invalid("generation", "must not be empty"));
        }

        if self.install_concurrency == 0 || self.install_concurrency > 32 {
            return Err(invalid("install_concurrency", "must be between 1 and 32"));
        }

        match self.origin_url()? {
            Some(origin) if !matches!(origin.scheme(), "http" | "https") => {
                return Err(invalid("origin", "scheme must be http or https"));
            }
            None if !self.manifest.is_empty() => {
                return Err(ConfigError::Missing {
                    field: "origin".into(),
                    hint: "Set OFFCACHE_ORIGIN so manifest paths can be resolved".into(),
                });
            }
            _ => {}
        }

        let prefixes = self
            .policy
            .network_only_prefixes
            .iter()
            .chain(self.policy.cache_first_prefixes.iter());
        for prefix in prefixes {
            if !prefix.starts_with('/') {
                return Err(ConfigError::Invalid {
                    field: "policy".into(),
                    reason: format!("prefix {prefix:?} must start with '/'"),
                });
            }
        }

        if self.auto_activate && self.manifest.is_empty() && self.origin.is_some() {
            tracing::warn!(
                generation = %self.generation,
                "manifest is empty; the generation will install without pre-cached assets"
            );
        }

        Ok(())
    }
}
