//! Task manager: the control surface over every task.
//!
//! Owns the registry, the driver collaborators, the credential vault and
//! the snapshot store. Background loops (health sweep, periodic snapshot)
//! are started with [`TaskManager::spawn_background`] and stopped by
//! [`TaskManager::shutdown`].

use crate::client::MessengerClient;
use crate::config::SendloopConfig;
use crate::credentials::CredentialVault;
use crate::health::{HealthAction, HealthMonitor, TaskProbe};
use crate::notify::{NotificationSink, TaskEvent};
use crate::persistence::SnapshotStore;
use crate::registry::{TaskHandle, TaskRegistry};
use crate::task::driver::{self, DriverContext};
use crate::task::log::{FileLogStore, TaskLogStore};
use crate::task::{
    Next, Phase, RetryPolicy, Severity, TaskMachine, TaskRequest, TaskSnapshot, TaskSpec,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Aggregate counters across all registered tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStats {
    pub total_tasks: usize,
    pub running_tasks: usize,
    pub paused_tasks: usize,
    pub total_sent: u64,
    pub total_failed: u64,
    pub active_sessions: usize,
    pub uptime_secs: u64,
}

/// Scheduler for every task in the process.
pub struct TaskManager {
    config: SendloopConfig,
    policy: RetryPolicy,
    monitor: HealthMonitor,
    registry: Arc<TaskRegistry>,
    ctx: DriverContext,
    vault: CredentialVault,
    snapshots: SnapshotStore,
    started_at: DateTime<Utc>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("tasks", &self.registry.len())
            .field("snapshot", &self.snapshots.path())
            .finish_non_exhaustive()
    }
}

impl TaskManager {
    /// Build a manager with file-backed task logs under the configured logs dir.
    pub fn new(
        config: SendloopConfig,
        client: Arc<dyn MessengerClient>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let log_store = Arc::new(FileLogStore::new(config.persistence.resolved_logs_dir()));
        Self::with_log_store(config, client, sink, log_store)
    }

    pub fn with_log_store(
        config: SendloopConfig,
        client: Arc<dyn MessengerClient>,
        sink: Arc<dyn NotificationSink>,
        log_store: Arc<dyn TaskLogStore>,
    ) -> Self {
        let ctx = DriverContext {
            client,
            sink,
            log_store,
            log_tail: config.persistence.log_tail,
        };
        Self {
            policy: RetryPolicy::from(&config.retry),
            monitor: HealthMonitor::from(&config.health),
            registry: Arc::new(TaskRegistry::new()),
            vault: CredentialVault::new(config.persistence.resolved_credentials_dir()),
            snapshots: SnapshotStore::new(config.persistence.resolved_snapshot_path()),
            started_at: Utc::now(),
            shutdown: CancellationToken::new(),
            ctx,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SendloopConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    fn handle(&self, task_id: &str) -> crate::Result<Arc<TaskHandle>> {
        self.registry
            .get(task_id)
            .ok_or_else(|| crate::LoopError::TaskNotFound(task_id.to_owned()))
    }

    fn view(&self, handle: &TaskHandle) -> TaskSnapshot {
        handle.lock().snapshot(self.config.persistence.log_tail)
    }

    // ── Control surface ─────────────────────────────────────────────────────

    /// Validate a submission, start it, and return the new task id.
    pub fn create_task(&self, request: &TaskRequest) -> crate::Result<String> {
        let spec = TaskSpec::from_request(request, &self.config.tasks)?;
        let task_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut machine = TaskMachine::new(&task_id, request, spec, self.policy, now);
        let launch = match machine.start(now) {
            Ok(launch) => launch,
            Err(e) => {
                warn!(%task_id, error = %e, "task rejected");
                return Err(e);
            }
        };

        if let Err(e) = self.vault.store(&task_id, machine.credential()) {
            warn!(%task_id, error = %e, "failed to persist credential");
        }

        let handle = Arc::new(TaskHandle::new(machine));
        self.registry.insert(Arc::clone(&handle))?;
        info!(%task_id, "task created");

        let view = self.view(&handle);
        driver::spawn(Arc::clone(&handle), self.ctx.clone(), launch);
        self.ctx.sink.publish_all(TaskEvent::TaskStarted {
            task_id: task_id.clone(),
            task: Box::new(view),
        });
        Ok(task_id)
    }

    /// Stop a task for good: cancel its loop, delete its credential
    /// artifact and deregister it.
    pub fn stop_task(&self, task_id: &str) -> crate::Result<()> {
        let handle = self
            .registry
            .remove(task_id)
            .ok_or_else(|| crate::LoopError::TaskNotFound(task_id.to_owned()))?;
        handle.cancel();
        handle.lock().stop(Utc::now());

        if let Err(e) = self.vault.remove(task_id) {
            warn!(%task_id, error = %e, "failed to delete credential");
        }
        self.ctx.flush_handle(&handle);
        self.ctx.sink.publish_all(TaskEvent::TaskStopped {
            task_id: task_id.to_owned(),
        });
        info!(%task_id, "task stopped");
        Ok(())
    }

    pub fn pause_task(&self, task_id: &str) -> crate::Result<()> {
        let handle = self.handle(task_id)?;
        handle.lock().pause(Utc::now())?;
        handle.cancel();
        self.ctx.flush_handle(&handle);
        info!(%task_id, "task paused");
        Ok(())
    }

    pub fn resume_task(&self, task_id: &str) -> crate::Result<()> {
        let handle = self.handle(task_id)?;
        let launch = handle.lock().resume(Utc::now())?;
        driver::spawn(handle, self.ctx.clone(), launch);
        info!(%task_id, "task resumed");
        Ok(())
    }

    /// Operator restart. Counts toward the task's restart budget.
    pub fn restart_task(&self, task_id: &str) -> crate::Result<()> {
        let handle = self.handle(task_id)?;
        self.force_restart(&handle, "restart requested")
    }

    fn force_restart(&self, handle: &Arc<TaskHandle>, reason: &str) -> crate::Result<()> {
        let (launch, max_restarts) = {
            let mut machine = handle.lock();
            (
                machine.restart(Utc::now(), reason),
                machine.spec().max_restarts,
            )
        };
        let launch = match launch {
            Ok(launch) => launch,
            Err(e) => {
                self.ctx.flush_handle(handle);
                return Err(e);
            }
        };
        let parked = launch.next == Next::Park;
        driver::spawn(Arc::clone(handle), self.ctx.clone(), launch);
        if parked {
            return Err(crate::LoopError::RestartCapExceeded {
                task_id: handle.id().to_owned(),
                max_restarts,
            });
        }
        info!(task_id = handle.id(), reason, "task restarting");
        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> crate::Result<TaskSnapshot> {
        Ok(self.view(&*self.handle(task_id)?))
    }

    #[must_use]
    pub fn list_tasks(&self) -> Vec<TaskSnapshot> {
        self.registry
            .handles()
            .iter()
            .map(|h| self.view(h))
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        let mut stats = ManagerStats {
            uptime_secs: (Utc::now() - self.started_at)
                .to_std()
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            ..ManagerStats::default()
        };
        for handle in self.registry.handles() {
            let machine = handle.lock();
            stats.total_tasks += 1;
            if machine.is_running() {
                stats.running_tasks += 1;
            }
            if machine.phase() == Phase::Paused {
                stats.paused_tasks += 1;
            }
            stats.total_sent += machine.stats().sent;
            stats.total_failed += machine.stats().failed;
            stats.active_sessions += usize::from(machine.stats().active_sessions);
        }
        stats
    }

    // ── Health ──────────────────────────────────────────────────────────────

    /// One health sweep. Returns the ids of the tasks that were restarted.
    pub fn check_health(&self, now: DateTime<Utc>) -> Vec<String> {
        let handles = self.registry.handles();
        let probes: Vec<TaskProbe> = handles
            .iter()
            .map(|h| {
                let machine = h.lock();
                TaskProbe {
                    task_id: h.id().to_owned(),
                    running: machine.is_running(),
                    last_activity: machine.last_activity(),
                    send_delay: machine.spec().delay,
                }
            })
            .collect();

        let mut restarted = Vec::new();
        for action in self.monitor.sweep(&probes, now) {
            let HealthAction::Restart { task_id, idle } = action;
            let Some(handle) = self.registry.get(&task_id) else {
                continue;
            };
            let reason = format!("no activity for {}s", idle.as_secs());
            warn!(%task_id, idle_secs = idle.as_secs(), "task stalled, forcing restart");
            match self.force_restart(&handle, &reason) {
                Ok(()) => restarted.push(task_id),
                Err(e) => warn!(%task_id, error = %e, "stalled task could not be restarted"),
            }
        }
        restarted
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    /// Write every running task to the snapshot file. Returns the task count.
    pub fn save_snapshot(&self) -> crate::Result<usize> {
        let log_tail = self.config.persistence.log_tail;
        let tasks: Vec<TaskSnapshot> = self
            .registry
            .handles()
            .iter()
            .filter_map(|h| {
                let machine = h.lock();
                machine.is_running().then(|| machine.snapshot(log_tail))
            })
            .collect();
        let count = tasks.len();
        self.snapshots.save(tasks, Utc::now())?;
        debug!(count, "snapshot saved");
        Ok(count)
    }

    /// Rebuild tasks from the snapshot file and re-arm them after the
    /// recovery grace delay. Returns the number of tasks re-armed.
    pub fn recover(&self) -> usize {
        let grace = Duration::from_secs(self.config.persistence.recovery_grace_secs);
        let now = Utc::now();
        let mut recovered = 0;

        for snapshot in self.snapshots.load_or_empty() {
            let task_id = snapshot.task_id.clone();
            if self.registry.get(&task_id).is_some() {
                continue;
            }

            let credential = match self.vault.load(&task_id) {
                Ok(credential) => credential,
                Err(e) => {
                    warn!(%task_id, error = %e, "cannot read credential");
                    None
                }
            };

            let handle = match credential {
                Some(credential) => {
                    let mut machine =
                        TaskMachine::from_snapshot(snapshot, credential, self.policy, now);
                    let launch = machine.recover(now, grace);
                    let handle = Arc::new(TaskHandle::new(machine));
                    if self.registry.insert(Arc::clone(&handle)).is_err() {
                        continue;
                    }
                    driver::spawn(Arc::clone(&handle), self.ctx.clone(), launch);
                    recovered += 1;
                    handle
                }
                None => {
                    let mut machine =
                        TaskMachine::from_snapshot(snapshot, String::new(), self.policy, now);
                    machine.record(
                        now,
                        Severity::Error,
                        "Credential missing, task not recovered",
                    );
                    let handle = Arc::new(TaskHandle::new(machine));
                    if self.registry.insert(Arc::clone(&handle)).is_err() {
                        continue;
                    }
                    self.ctx.flush_handle(&handle);
                    handle
                }
            };
            let view = self.view(&handle);
            self.ctx.sink.publish_all(TaskEvent::TaskStarted {
                task_id,
                task: Box::new(view),
            });
        }

        if recovered > 0 {
            info!(recovered, "tasks recovered from snapshot");
        }
        recovered
    }

    // ── Background loops ────────────────────────────────────────────────────

    /// Start the health sweep and the periodic snapshot writer.
    pub fn spawn_background(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let health_period = Duration::from_secs(self.config.health.check_interval_secs.max(1));
        let snapshot_period =
            Duration::from_secs(self.config.persistence.snapshot_interval_secs.max(1));

        let health = {
            let manager = Arc::clone(self);
            periodic(self.shutdown.clone(), health_period, move || {
                manager.check_health(Utc::now());
            })
        };
        let snapshot = {
            let manager = Arc::clone(self);
            periodic(self.shutdown.clone(), snapshot_period, move || {
                if let Err(e) = manager.save_snapshot() {
                    warn!(error = %e, "periodic snapshot failed");
                }
            })
        };
        vec![health, snapshot]
    }

    /// Stop background loops, write a final snapshot, and cancel every
    /// driver loop. Task state is left as-is so the snapshot can re-arm it.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        if let Err(e) = self.save_snapshot() {
            warn!(error = %e, "final snapshot failed");
        }
        for handle in self.registry.handles() {
            handle.cancel();
        }
        info!("task manager stopped");
    }
}

fn periodic(
    shutdown: CancellationToken,
    period: Duration,
    mut tick: impl FnMut() + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => tick(),
            }
        }
    })
}
