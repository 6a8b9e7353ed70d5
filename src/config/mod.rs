//! Configuration layer: typed settings with layered precedence (file → env).
//!
//! Settings load from `config/default.toml`, then a local
//! `catenaccio.toml`, then `CATENACCIO__`-prefixed environment variables,
//! each layer overriding the previous one. Every knob has a default, so a
//! bare process runs without any configuration at all.

use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "catenaccio";
const ENV_PREFIX: &str = "CATENACCIO";

const DEFAULT_COALESCE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REVALIDATION_WORKERS: usize = 4;
const DEFAULT_UPSTREAM_MAX_CONCURRENT_REQUESTS: usize = 10;
const DEFAULT_UPSTREAM_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Top-level settings for the caching subsystem.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub upstream: UpstreamSettings,
    pub logging: LoggingSettings,
}

/// Cache manager knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum seconds a non-initiating caller waits on an in-flight fetch.
    pub coalesce_timeout_seconds: u64,
    /// Concurrent background revalidation slots.
    pub revalidation_workers: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            coalesce_timeout_seconds: DEFAULT_COALESCE_TIMEOUT_SECS,
            revalidation_workers: DEFAULT_REVALIDATION_WORKERS,
        }
    }
}

impl CacheSettings {
    pub fn coalesce_timeout(&self) -> Duration {
        Duration::from_secs(self.coalesce_timeout_seconds)
    }

    /// Revalidation pool size, clamped to at least one slot.
    pub fn revalidation_workers_non_zero(&self) -> usize {
        self.revalidation_workers.max(1)
    }
}

/// Limits applied to outbound upstream requests (consumed by fetch
/// closures, not by the cache itself).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Process-wide cap on concurrent outbound API calls.
    pub max_concurrent_requests: usize,
    /// Per-request timeout for fetch implementations.
    pub request_timeout_seconds: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_UPSTREAM_MAX_CONCURRENT_REQUESTS,
            request_timeout_seconds: DEFAULT_UPSTREAM_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl UpstreamSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Base tracing directive (`trace`..`error`), overridable via
    /// `RUST_LOG`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl LoadError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Load settings from the layered sources and validate them.
pub fn load() -> Result<Settings, LoadError> {
    let raw = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let settings: Settings = raw.try_deserialize()?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), LoadError> {
    if settings.cache.coalesce_timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.coalesce_timeout_seconds",
            "timeout must be greater than zero",
        ));
    }
    if settings.upstream.max_concurrent_requests == 0 {
        return Err(LoadError::invalid(
            "upstream.max_concurrent_requests",
            "at least one concurrent request must be allowed",
        ));
    }
    if settings.upstream.request_timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "upstream.request_timeout_seconds",
            "timeout must be greater than zero",
        ));
    }
    Ok(())
}
