//! Configuration types for the Hub runtime.
//!
//! Stored as TOML at [`hub_dirs::config_file`](crate::hub_dirs::config_file).
//! Every section is `#[serde(default)]`, so a partial file (or no file at
//! all) yields the built-in defaults for anything left out.

use crate::error::{HubError, Result};
pub use kilu_extract::ExtractConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Control Plane used when neither the config file nor the session names one.
pub const DEFAULT_CONTROL_PLANE_URL: &str = "https://localhost:8443";

/// Top-level configuration for a Hub.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Control Plane connection settings.
    pub control_plane: ControlPlaneConfig,
    /// Task loop limits and timings.
    pub runtime: RuntimeConfig,
    /// Page extraction limits and timeouts.
    pub extract: ExtractConfig,
}

/// Control Plane connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Base URL. Normalized to end in `/v1` before use.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Allow `http://` base URLs (local development only).
    pub allow_insecure: bool,
    /// `max` parameter sent when polling the queue.
    pub queue_max: u32,
    /// Steps requested per mint call.
    pub step_batch_size: u32,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CONTROL_PLANE_URL.to_owned(),
            request_timeout_secs: 30,
            allow_insecure: false,
            queue_max: 1,
            step_batch_size: 1,
        }
    }
}

impl ControlPlaneConfig {
    /// The API root for this config's `base_url`.
    ///
    /// # Errors
    ///
    /// See [`normalize_base_url`].
    pub fn api_base(&self) -> Result<String> {
        normalize_base_url(&self.base_url, self.allow_insecure)
    }
}

/// Task loop limits and timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Attempts allowed in any rolling hour.
    pub max_runs_per_hour: usize,
    /// Sleep when the hourly cap is reached, in milliseconds.
    pub hourly_cap_sleep_ms: u64,
    /// Wake resource timeout per attempt, in milliseconds (at most 120000).
    pub wake_timeout_ms: u64,
    /// Lease refresh period while a task runs, in milliseconds.
    pub heartbeat_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_runs_per_hour: 20,
            hourly_cap_sleep_ms: 300_000,
            wake_timeout_ms: 120_000,
            heartbeat_interval_ms: 30_000,
        }
    }
}

impl HubConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&content).map_err(|e| HubError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| HubError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.control_plane.api_base()?;
        if self.control_plane.request_timeout_secs == 0 {
            return Err(HubError::Config(
                "control_plane.request_timeout_secs must be > 0".into(),
            ));
        }
        if self.control_plane.queue_max == 0 {
            return Err(HubError::Config("control_plane.queue_max must be > 0".into()));
        }
        if self.control_plane.step_batch_size == 0 {
            return Err(HubError::Config(
                "control_plane.step_batch_size must be > 0".into(),
            ));
        }
        if self.runtime.max_runs_per_hour == 0 {
            return Err(HubError::Config("runtime.max_runs_per_hour must be > 0".into()));
        }
        if self.runtime.wake_timeout_ms == 0 || self.runtime.wake_timeout_ms > 120_000 {
            return Err(HubError::Config(
                "runtime.wake_timeout_ms must be in 1..=120000".into(),
            ));
        }
        if self.runtime.heartbeat_interval_ms == 0 {
            return Err(HubError::Config(
                "runtime.heartbeat_interval_ms must be > 0".into(),
            ));
        }
        self.extract
            .validate()
            .map_err(|e| HubError::Config(e.to_string()))
    }
}

/// Normalize a Control Plane base URL: trailing slashes trimmed and `/v1`
/// appended when missing.
///
/// # Errors
///
/// Returns [`HubError::Config`] if the URL is empty or unparseable, or uses
/// `http://` while `allow_insecure` is off.
pub fn normalize_base_url(raw: &str, allow_insecure: bool) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(HubError::Config("control plane base URL is empty".into()));
    }
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| HubError::Config(format!("invalid control plane URL {trimmed}: {e}")))?;
    match parsed.scheme() {
        "https" => {}
        "http" if allow_insecure => {}
        scheme => {
            return Err(HubError::Config(format!(
                "control plane URL must use https:// (got {scheme}://)"
            )));
        }
    }

    let mut normalized = trimmed.to_owned();
    if !normalized.ends_with("/v1") {
        normalized.push_str("/v1");
    }
    Ok(normalized)
}
