//! Liveness sweep for running tasks.
//!
//! The monitor is **pure logic**: it inspects [`TaskProbe`]s and returns
//! [`HealthAction`]s for the manager to execute. The periodic loop that
//! drives it lives in [`crate::manager`].

use chrono::{DateTime, Utc};
use std::time::Duration;

/// What the monitor needs to know about one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProbe {
    pub task_id: String,
    pub running: bool,
    pub last_activity: DateTime<Utc>,
    /// Configured gap between sends; a task waiting this long is not stuck.
    pub send_delay: Duration,
}

/// Corrective action produced by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthAction {
    /// Force the task through its restart path.
    Restart { task_id: String, idle: Duration },
}

/// Decides which tasks have gone quiet for too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthMonitor {
    stale_after: Duration,
}

impl HealthMonitor {
    pub fn new(stale_after: Duration) -> Self {
        Self { stale_after }
    }

    #[must_use]
    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Threshold for one task: the base window plus its own send delay.
    #[must_use]
    pub fn threshold(&self, probe: &TaskProbe) -> Duration {
        self.stale_after.saturating_add(probe.send_delay)
    }

    /// How long the task has been idle, if it is past its threshold.
    #[must_use]
    pub fn idle_time(&self, probe: &TaskProbe, now: DateTime<Utc>) -> Option<Duration> {
        if !probe.running {
            return None;
        }
        // Clock skew backwards counts as fresh.
        let idle = (now - probe.last_activity).to_std().ok()?;
        (idle > self.threshold(probe)).then_some(idle)
    }

    /// One sweep over every registered task.
    pub fn sweep<'a>(
        &self,
        probes: impl IntoIterator<Item = &'a TaskProbe>,
        now: DateTime<Utc>,
    ) -> Vec<HealthAction> {
        probes
            .into_iter()
            .filter_map(|probe| {
                self.idle_time(probe, now).map(|idle| HealthAction::Restart {
                    task_id: probe.task_id.clone(),
                    idle,
                })
            })
            .collect()
    }
}

impl From<&crate::config::HealthConfig> for HealthMonitor {
    fn from(config: &crate::config::HealthConfig) -> Self {
        Self::new(Duration::from_secs(config.stale_after_secs))
    }
}
