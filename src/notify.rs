//! Notification sink for task events.
//!
//! The scheduler never talks to a UI directly. It publishes [`TaskEvent`]s
//! to a [`NotificationSink`]; the host bridge subscribes and forwards them.

use crate::task::{Severity, TaskSnapshot};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default broadcast buffer for [`BroadcastSink`].
pub const EVENT_CAPACITY: usize = 256;

/// Event emitted by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Log {
        message: String,
        severity: Severity,
    },
    TaskStarted {
        #[serde(rename = "taskId")]
        task_id: String,
        task: Box<TaskSnapshot>,
    },
    TaskUpdated {
        #[serde(rename = "taskId")]
        task_id: String,
        task: Box<TaskSnapshot>,
    },
    TaskStopped {
        #[serde(rename = "taskId")]
        task_id: String,
    },
}

/// A published event with its audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// `None` for broadcasts to every observer.
    #[serde(rename = "taskId", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(flatten)]
    pub event: TaskEvent,
}

/// Outbound event channel.
///
/// Publishing must never block or fail the caller; sinks drop events they
/// cannot deliver.
pub trait NotificationSink: Send + Sync {
    /// Publish to observers of one task.
    fn publish(&self, task_id: &str, event: TaskEvent);

    /// Publish to every observer.
    fn publish_all(&self, event: TaskEvent);
}

/// Fan-out sink backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    fn send(&self, notification: Notification) {
        // No subscribers is fine.
        let _ = self.tx.send(notification);
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl NotificationSink for BroadcastSink {
    fn publish(&self, task_id: &str, event: TaskEvent) {
        self.send(Notification {
            task_id: Some(task_id.to_owned()),
            event,
        });
    }

    fn publish_all(&self, event: TaskEvent) {
        self.send(Notification {
            task_id: None,
            event,
        });
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn publish(&self, _task_id: &str, _event: TaskEvent) {}

    fn publish_all(&self, _event: TaskEvent) {}
}
