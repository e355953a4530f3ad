use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::networking::EngineOptions;
use crate::retry::RetryParameters;

/// Retry parameters (optional `[retry]` section in config.toml). Durations
/// are in milliseconds; missing keys take the library defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per request (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
    /// Random jitter, as a fraction of the delay (0.5 = ±50%).
    pub fuzz_factor: f64,
    /// Whole-request timeout (0 = none).
    pub timeout_ms: u64,
    /// Abort an attempt when no bytes arrive for this long (0 = never).
    pub stall_timeout_ms: u64,
    /// Abort an attempt when the first byte takes longer than this (0 = never).
    pub connection_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let defaults = RetryParameters::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_ms: millis(defaults.base_delay),
            backoff_factor: defaults.backoff_factor,
            fuzz_factor: defaults.fuzz_factor,
            timeout_ms: millis(defaults.timeout),
            stall_timeout_ms: millis(defaults.stall_timeout),
            connection_timeout_ms: millis(defaults.connection_timeout),
        }
    }
}

impl From<&RetryConfig> for RetryParameters {
    fn from(cfg: &RetryConfig) -> Self {
        RetryParameters {
            max_attempts: cfg.max_attempts,
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            backoff_factor: cfg.backoff_factor,
            fuzz_factor: cfg.fuzz_factor,
            timeout: Duration::from_millis(cfg.timeout_ms),
            stall_timeout: Duration::from_millis(cfg.stall_timeout_ms),
            connection_timeout: Duration::from_millis(cfg.connection_timeout_ms),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Global configuration loaded from `~/.config/medianet/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedianetConfig {
    /// Rewrite `http://` URIs to `https://` before dispatch.
    pub force_https: bool,
    /// Rewrite `https://` URIs to `http://` (ignored when `force_https` is set).
    pub force_http: bool,
    /// Scheme assumed for scheme-relative URIs such as `//cdn/a.mpd`.
    pub location_scheme: String,
    /// Optional retry parameters; if missing, built-in defaults are used.
    pub retry: Option<RetryConfig>,
}

impl Default for MedianetConfig {
    fn default() -> Self {
        let options = EngineOptions::default();
        Self {
            force_https: options.force_https,
            force_http: options.force_http,
            location_scheme: options.location_scheme,
            retry: None,
        }
    }
}

impl MedianetConfig {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            force_https: self.force_https,
            force_http: self.force_http,
            location_scheme: self.location_scheme.clone(),
        }
    }

    /// Retry parameters for new requests.
    pub fn retry_parameters(&self) -> RetryParameters {
        self.retry
            .as_ref()
            .map(RetryParameters::from)
            .unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("medianet")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MedianetConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MedianetConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<MedianetConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: MedianetConfig =
        toml::from_str(&data).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}
