//! Task model: submitted input, validated settings, statistics and lifecycle.
//!
//! A task repeatedly walks its rendered message list, handing each message
//! to the delegated client. [`machine::TaskMachine`] owns the lifecycle;
//! [`driver`] runs it on the tokio runtime.

pub mod driver;
pub mod log;
pub mod machine;
pub mod retry;
pub mod snapshot;

pub use log::{LogEntry, Severity, TaskLog};
pub use machine::{Launch, Next, Op, Phase, TaskMachine, Trigger};
pub use retry::{RetryPolicy, SendRoute};
pub use snapshot::TaskSnapshot;

use crate::config::TaskDefaults;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Task submission as received from the control surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskRequest {
    /// Raw credential blob.
    pub credential: String,
    /// How the credential was entered (free text, passed to the client).
    pub credential_mode: Option<String>,
    /// Raw multi-line message text.
    pub messages: Option<String>,
    /// Name placed before every line.
    pub leading_name: Option<String>,
    /// Name placed after every line.
    pub trailing_name: Option<String>,
    /// Conversation identifier to deliver into.
    #[serde(alias = "threadID")]
    pub destination: String,
    /// Seconds between sends.
    pub delay_secs: Option<u64>,
    /// Login retries before the task gives up.
    pub max_login_retries: Option<u32>,
    /// Lifetime restart budget.
    pub max_restarts: Option<u32>,
}

/// Validated, immutable task settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub credential: String,
    pub credential_mode: String,
    pub destination: String,
    pub delay: Duration,
    pub max_login_retries: u32,
    pub max_restarts: u32,
}

impl TaskSpec {
    /// Apply defaults and limits to a submission.
    ///
    /// Credential structure is checked later, on start.
    pub fn from_request(request: &TaskRequest, defaults: &TaskDefaults) -> crate::Result<Self> {
        let destination = request.destination.trim();
        if destination.is_empty() {
            return Err(crate::LoopError::InvalidInput(
                "destination is required".to_owned(),
            ));
        }

        let delay_secs = request.delay_secs.unwrap_or(defaults.delay_secs);
        if delay_secs < defaults.min_delay_secs {
            return Err(crate::LoopError::InvalidInput(format!(
                "delay must be at least {}s",
                defaults.min_delay_secs
            )));
        }

        Ok(Self {
            credential: request.credential.trim().to_owned(),
            credential_mode: request
                .credential_mode
                .clone()
                .unwrap_or_else(|| "text".to_owned()),
            destination: destination.to_owned(),
            delay: Duration::from_secs(delay_secs),
            max_login_retries: request
                .max_login_retries
                .unwrap_or(defaults.max_login_retries)
                .min(defaults.max_login_retries_limit),
            max_restarts: request.max_restarts.unwrap_or(defaults.max_restarts),
        })
    }
}

/// Delivery statistics for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub sent: u64,
    pub failed: u64,
    /// 1 while a session is held, else 0.
    #[serde(rename = "activeCookies")]
    pub active_sessions: u8,
    pub loops: u64,
    pub restarts: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
}
