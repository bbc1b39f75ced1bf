//! Authoritative in-memory map of task id → task.
//!
//! Owned explicitly (shared by `Arc`) between the manager, the health
//! monitor and the snapshot loop. Entries are inserted on create and
//! removed only on explicit stop.

use crate::task::TaskMachine;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// One registered task: its state machine plus the cancellation handle of
/// the driver loop currently executing it.
#[derive(Debug)]
pub struct TaskHandle {
    id: String,
    machine: Mutex<TaskMachine>,
    cancel: Mutex<CancellationToken>,
}

impl TaskHandle {
    pub fn new(machine: TaskMachine) -> Self {
        Self {
            id: machine.id().to_owned(),
            machine: Mutex::new(machine),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lock the state machine. A poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, TaskMachine> {
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cancel the current driver loop and hand out a token for the next one.
    pub fn rearm(&self) -> CancellationToken {
        let mut guard = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        guard.cancel();
        *guard = CancellationToken::new();
        guard.clone()
    }

    /// Cancel the current driver loop.
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }
}

/// Task id → task map.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, Arc<TaskHandle>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<TaskHandle>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a task. Fails if the id is taken.
    pub fn insert(&self, handle: Arc<TaskHandle>) -> crate::Result<()> {
        let mut map = self.map();
        if map.contains_key(handle.id()) {
            return Err(crate::LoopError::AlreadyRunning(handle.id().to_owned()));
        }
        map.insert(handle.id().to_owned(), handle);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<Arc<TaskHandle>> {
        self.map().get(task_id).cloned()
    }

    pub fn remove(&self, task_id: &str) -> Option<Arc<TaskHandle>> {
        self.map().remove(task_id)
    }

    /// All handles, sorted by id for stable output.
    #[must_use]
    pub fn handles(&self) -> Vec<Arc<TaskHandle>> {
        let mut handles: Vec<_> = self.map().values().cloned().collect();
        handles.sort_by(|a, b| a.id().cmp(b.id()));
        handles
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::TaskDefaults;
    use crate::task::{RetryPolicy, TaskRequest, TaskSpec};
    use chrono::Utc;

    fn handle(id: &str) -> Arc<TaskHandle> {
        let req = TaskRequest {
            credential: "c_user=1; xs=2".to_owned(),
            messages: Some("hi".to_owned()),
            leading_name: Some("a".to_owned()),
            trailing_name: Some("b".to_owned()),
            destination: "t".to_owned(),
            ..TaskRequest::default()
        };
        let spec = TaskSpec::from_request(&req, &TaskDefaults::default()).unwrap();
        Arc::new(TaskHandle::new(TaskMachine::new(
            id,
            &req,
            spec,
            RetryPolicy::default(),
            Utc::now(),
        )))
    }

    #[test]
    fn insert_get_remove() {
        let registry = TaskRegistry::new();
        registry.insert(handle("b")).unwrap();
        registry.insert(handle("a")).unwrap();
        assert!(registry.insert(handle("a")).is_err());
        assert_eq!(registry.len(), 2);

        let ids: Vec<_> = registry
            .handles()
            .iter()
            .map(|h| h.id().to_owned())
            .collect();
        assert_eq!(ids, ["a", "b"]);

        assert!(registry.remove("a").is_some());
        assert!(registry.get("a").is_none());
        assert!(registry.get("b").is_some());
    }

    #[test]
    fn rearm_cancels_previous_token() {
        let h = handle("x");
        let first = h.rearm();
        let second = h.rearm();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        h.cancel();
        assert!(second.is_cancelled());
    }
}
