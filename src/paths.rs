//! Centralized directory paths for sendloop.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Directory Layout
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/sendloop/` | `~/.local/share/sendloop/` |
//! | Config | `~/Library/Application Support/sendloop/` | `~/.config/sendloop/` |
//!
//! # Environment Overrides
//!
//! - `SENDLOOP_DATA_DIR`: overrides [`data_dir`]
//! - `SENDLOOP_CONFIG_DIR`: overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Holds the task snapshot, persisted credentials and per-task logs.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SENDLOOP_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("sendloop"))
        .unwrap_or_else(|| PathBuf::from("/tmp/sendloop-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SENDLOOP_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("sendloop"))
        .unwrap_or_else(|| PathBuf::from("/tmp/sendloop-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Task snapshot file (`data_dir()/tasks.json`).
#[must_use]
pub fn snapshot_file() -> PathBuf {
    data_dir().join("tasks.json")
}

/// Persisted task credentials (`data_dir()/credentials/`).
#[must_use]
pub fn credentials_dir() -> PathBuf {
    data_dir().join("credentials")
}

/// Per-task and process log files (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}
