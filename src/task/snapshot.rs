//! Persisted and wire shape of a task.
//!
//! Field names follow the JSON contract consumed by the control panel, so
//! they are renamed explicitly rather than derived from Rust names. The
//! live session handle is never part of a snapshot.

use crate::task::TaskStats;
use crate::task::log::LogEntry;
use serde::{Deserialize, Serialize};

/// Point-in-time view of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub config: SnapshotConfig,
    #[serde(rename = "messageData")]
    pub message_data: MessageData,
    pub stats: TaskStats,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// Task settings (everything but the credential and the session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Seconds between sends.
    pub delay: u64,
    pub running: bool,
    #[serde(rename = "restartCount")]
    pub restart_count: u32,
    #[serde(rename = "maxRestarts")]
    pub max_restarts: u32,
    #[serde(rename = "cookieMode", default)]
    pub credential_mode: String,
    #[serde(rename = "maxRetries", default = "default_max_retries")]
    pub max_login_retries: u32,
}

fn default_max_retries() -> u32 {
    crate::config::TaskDefaults::default().max_login_retries
}

/// Message sequence and cursor state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    #[serde(rename = "threadID")]
    pub destination: String,
    pub messages: Vec<String>,
    #[serde(rename = "currentIndex")]
    pub current_index: usize,
    #[serde(rename = "loopCount")]
    pub loop_count: u64,
}
