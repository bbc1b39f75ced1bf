//! Configuration types for the task scheduler.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SendloopConfig {
    /// Backoff intervals and per-message retry caps.
    pub retry: RetryConfig,
    /// Defaults and limits applied to submitted tasks.
    pub tasks: TaskDefaults,
    /// Stalled-task detection.
    pub health: HealthConfig,
    /// Snapshot and recovery settings.
    pub persistence: PersistenceConfig,
    /// Process logging.
    pub logging: LoggingConfig,
}

/// Fixed-interval retry settings shared by every task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Wait between login attempts.
    pub login_backoff_secs: u64,
    /// Extra attempts for one message on the general send path.
    pub send_retries: u32,
    /// Wait between general send attempts.
    pub send_backoff_secs: u64,
    /// Extra rounds for one message on the 15-digit destination path.
    pub special_send_retries: u32,
    /// Wait between 15-digit destination rounds.
    pub special_send_backoff_secs: u64,
    /// Cool-down before a restarting task re-authenticates.
    pub restart_cooldown_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            login_backoff_secs: 5,
            send_retries: 3,
            send_backoff_secs: 3,
            special_send_retries: 2,
            special_send_backoff_secs: 5,
            restart_cooldown_secs: 10,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn login_backoff(&self) -> Duration {
        Duration::from_secs(self.login_backoff_secs)
    }

    #[must_use]
    pub fn send_backoff(&self) -> Duration {
        Duration::from_secs(self.send_backoff_secs)
    }

    #[must_use]
    pub fn special_send_backoff(&self) -> Duration {
        Duration::from_secs(self.special_send_backoff_secs)
    }

    #[must_use]
    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.restart_cooldown_secs)
    }
}

/// Defaults for fields a task submission may omit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDefaults {
    /// Delay between consecutive sends.
    pub delay_secs: u64,
    /// Smallest delay a submission may request.
    pub min_delay_secs: u64,
    /// Login retries when a submission does not specify one.
    pub max_login_retries: u32,
    /// Upper bound for a submitted login retry count.
    pub max_login_retries_limit: u32,
    /// Lifetime restart budget per task.
    pub max_restarts: u32,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            delay_secs: 5,
            min_delay_secs: 1,
            max_login_retries: 3,
            max_login_retries_limit: 20,
            max_restarts: 10,
        }
    }
}

/// Health monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Sweep period.
    pub check_interval_secs: u64,
    /// A running task idle for longer than this is force-restarted.
    pub stale_after_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            stale_after_secs: 300,
        }
    }
}

/// Snapshot persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Snapshot file location (None = [`crate::paths::snapshot_file`]).
    pub snapshot_path: Option<PathBuf>,
    /// Directory for persisted credentials (None = [`crate::paths::credentials_dir`]).
    pub credentials_dir: Option<PathBuf>,
    /// Directory for per-task log files (None = [`crate::paths::logs_dir`]).
    pub logs_dir: Option<PathBuf>,
    /// Period between snapshot writes.
    pub snapshot_interval_secs: u64,
    /// Delay before recovered tasks re-authenticate.
    pub recovery_grace_secs: u64,
    /// Number of newest log entries kept per task in the snapshot.
    pub log_tail: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            credentials_dir: None,
            logs_dir: None,
            snapshot_interval_secs: 30,
            recovery_grace_secs: 5,
            log_tail: 50,
        }
    }
}

impl PersistenceConfig {
    #[must_use]
    pub fn resolved_snapshot_path(&self) -> PathBuf {
        self.snapshot_path
            .clone()
            .unwrap_or_else(crate::paths::snapshot_file)
    }

    #[must_use]
    pub fn resolved_credentials_dir(&self) -> PathBuf {
        self.credentials_dir
            .clone()
            .unwrap_or_else(crate::paths::credentials_dir)
    }

    #[must_use]
    pub fn resolved_logs_dir(&self) -> PathBuf {
        self.logs_dir.clone().unwrap_or_else(crate::paths::logs_dir)
    }
}

/// Process-level logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    /// Also write a daily-rotated log file under the logs directory.
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: false,
        }
    }
}

impl SendloopConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::LoopError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::LoopError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from the default path, or defaults when no file exists yet.
    pub fn load_or_default() -> crate::error::Result<Self> {
        let path = Self::default_config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::paths::config_file()
    }
}
