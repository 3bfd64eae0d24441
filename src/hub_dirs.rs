//! Filesystem locations used by the Hub.
//!
//! Paths resolve through the [`dirs`] crate so they land in the platform's
//! usual per-user locations.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data | `~/Library/Application Support/kilu-hub/` | `~/.local/share/kilu-hub/` |
//! | Config | `~/Library/Application Support/kilu-hub/` | `~/.config/kilu-hub/` |
//!
//! # Environment Overrides
//!
//! - `KILU_DATA_DIR` overrides [`data_dir`]
//! - `KILU_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Data root: escalation cache, session file, logs.
///
/// Resolves to `dirs::data_dir()/kilu-hub/` unless `KILU_DATA_DIR` is set.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("KILU_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("kilu-hub"))
        .unwrap_or_else(|| PathBuf::from("/tmp/kilu-hub-data"))
}

/// Config root holding `config.toml`.
///
/// Resolves to `dirs::config_dir()/kilu-hub/` unless `KILU_CONFIG_DIR` is set.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("KILU_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("kilu-hub"))
        .unwrap_or_else(|| PathBuf::from("/tmp/kilu-hub-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Session file path (`data_dir()/session.json`).
#[must_use]
pub fn session_file() -> PathBuf {
    data_dir().join("session.json")
}

/// Escalation cache path (`data_dir()/escalations.json`).
#[must_use]
pub fn escalation_file() -> PathBuf {
    data_dir().join("escalations.json")
}
