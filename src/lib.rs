//! Sendloop: lifecycle and retry scheduler for long-running message send loops.
//!
//! Each task repeatedly delivers a rendered message sequence to one
//! destination through a delegated messaging client, surviving transient
//! failures and process restarts.
//!
//! # Architecture
//!
//! - **Sequencer**: renders raw multi-line input into the cyclic message list
//! - **Task machine**: pure lifecycle state machine (`task::machine`)
//! - **Driver**: one cancellable tokio loop per task executing machine steps
//! - **Retry policy**: fixed-interval backoffs with independent caps
//! - **Health monitor**: force-restarts running tasks that went quiet
//! - **Registry & persistence**: task map plus atomic JSON snapshots
//! - **Host bridge**: newline-delimited JSON control surface over stdio

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod health;
pub mod host;
pub mod manager;
pub mod notify;
pub mod paths;
pub mod persistence;
pub mod registry;
pub mod sequencer;
pub mod task;

#[cfg(test)]
pub(crate) mod test_utils;

pub use client::{ClientError, ClientErrorKind, MessengerClient, Session};
pub use config::SendloopConfig;
pub use error::{LoopError, Result};
pub use manager::{ManagerStats, TaskManager};
pub use notify::{NotificationSink, TaskEvent};
pub use task::{TaskRequest, TaskSnapshot};
