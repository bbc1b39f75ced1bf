//! Task lifecycle state machine.
//!
//! The machine is **pure logic**: no async I/O and no timers. Control
//! operations (`start`, `pause`, `resume`, `restart`, `stop`) and outcome
//! triggers from the driver go in; the next step to execute comes out as a
//! [`Next`]. The driver sleeps, calls the client, and feeds the result back
//! through [`TaskMachine::apply`].
//!
//! Every driver loop is bound to an epoch. Operations that (re)launch or
//! park the task bump the epoch, so a trigger produced by a superseded loop
//! is ignored instead of racing the current one.

use crate::client::{ClientError, Destination, LoginOptions, MessageBody, Session};
use crate::sequencer::render_messages;
use crate::task::log::{LogEntry, Severity, TaskLog};
use crate::task::retry::{
    RetryCounters, RetryDecision, RetryPolicy, SendRoute, is_special_destination,
};
use crate::task::snapshot::{MessageData, SnapshotConfig, TaskSnapshot};
use crate::task::{TaskRequest, TaskSpec, TaskStats};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Authenticating,
    Sending,
    Paused,
    Restarting,
    Stopped,
}

/// Work the driver performs once the delay of a [`Next::Run`] elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Log in with the task credential.
    Login,
    /// Deliver one message.
    Send(SendAttempt),
    /// The restart cool-down is over.
    Reauthenticate,
}

/// One delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAttempt {
    pub body: MessageBody,
    pub destination: Destination,
    pub route: SendRoute,
}

/// What the driver should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Run { after: Duration, op: Op },
    /// Nothing scheduled; the driver loop exits.
    Park,
}

impl Next {
    fn now(op: Op) -> Self {
        Self::Run {
            after: Duration::ZERO,
            op,
        }
    }
}

/// A driver loop to spawn, bound to the epoch it must present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub epoch: u64,
    pub next: Next,
}

/// Outcome reported by the driver.
#[derive(Debug, Clone)]
pub enum Trigger {
    LoginSucceeded(Session),
    LoginFailed(ClientError),
    Delivered,
    DeliveryFailed(ClientError),
    CooldownElapsed,
}

/// Lifecycle and runtime state of one task.
#[derive(Debug)]
pub struct TaskMachine {
    id: String,
    spec: TaskSpec,
    messages: Vec<String>,
    policy: RetryPolicy,
    phase: Phase,
    running: bool,
    epoch: u64,
    session: Option<Session>,
    last_activity: DateTime<Utc>,
    cursor: usize,
    counters: RetryCounters,
    /// Route of the attempt currently awaiting an outcome.
    in_flight: Option<SendRoute>,
    stats: TaskStats,
    log: TaskLog,
    /// Entries not yet handed to the durable store and the sink.
    outbox: Vec<LogEntry>,
}

impl TaskMachine {
    /// Build a task from a submission. Rendering problems are logged, not fatal.
    pub fn new(
        id: impl Into<String>,
        request: &TaskRequest,
        spec: TaskSpec,
        policy: RetryPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let rendered = render_messages(
            request.messages.as_deref(),
            request.leading_name.as_deref(),
            request.trailing_name.as_deref(),
        );
        let mut machine = Self::with_messages(id, spec, rendered.messages, policy, now);
        if let Some(warning) = rendered.warning {
            machine.record(now, Severity::Warning, format!("Missing input: {warning}"));
        }
        machine
    }

    fn with_messages(
        id: impl Into<String>,
        spec: TaskSpec,
        messages: Vec<String>,
        policy: RetryPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            spec,
            messages,
            policy,
            phase: Phase::Created,
            running: false,
            epoch: 0,
            session: None,
            last_activity: now,
            cursor: 0,
            counters: RetryCounters::default(),
            in_flight: None,
            stats: TaskStats::default(),
            log: TaskLog::default(),
            outbox: Vec::new(),
        }
    }

    /// Rebuild a task from a persisted snapshot. The task is left parked;
    /// call [`Self::recover`] to re-arm it.
    pub fn from_snapshot(
        snapshot: TaskSnapshot,
        credential: String,
        policy: RetryPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let spec = TaskSpec {
            credential,
            credential_mode: snapshot.config.credential_mode,
            destination: snapshot.message_data.destination,
            delay: Duration::from_secs(snapshot.config.delay),
            max_login_retries: snapshot.config.max_login_retries,
            max_restarts: snapshot.config.max_restarts,
        };
        let mut machine = Self::with_messages(
            snapshot.task_id,
            spec,
            snapshot.message_data.messages,
            policy,
            now,
        );
        let len = machine.messages.len();
        machine.cursor = if len == 0 {
            0
        } else {
            snapshot.message_data.current_index % len
        };
        machine.counters.restarts = snapshot.config.restart_count.max(snapshot.stats.restarts);
        machine.stats = snapshot.stats;
        machine.stats.loops = machine.stats.loops.max(snapshot.message_data.loop_count);
        machine.stats.active_sessions = 0;
        machine.stats.restarts = machine.counters.restarts;
        machine.log = TaskLog::from_entries(snapshot.logs);
        machine
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    #[must_use]
    pub fn stats(&self) -> &TaskStats {
        &self.stats
    }

    #[must_use]
    pub fn restart_count(&self) -> u32 {
        self.counters.restarts
    }

    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    #[must_use]
    pub fn credential(&self) -> &str {
        &self.spec.credential
    }

    #[must_use]
    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    #[must_use]
    pub fn log(&self) -> &TaskLog {
        &self.log
    }

    /// Session to send with; `None` whenever the task is not running.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        if self.running {
            self.session.as_ref()
        } else {
            None
        }
    }

    #[must_use]
    pub fn login_options(&self) -> LoginOptions {
        LoginOptions {
            credential_mode: self.spec.credential_mode.clone(),
        }
    }

    /// Drain log entries produced since the last call.
    pub fn take_outbox(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.outbox)
    }

    /// Append an entry to the task log.
    pub fn record(&mut self, now: DateTime<Utc>, severity: Severity, message: impl Into<String>) {
        let entry = LogEntry {
            time: now,
            message: message.into(),
            severity,
        };
        self.log.push(entry.clone());
        self.outbox.push(entry);
    }

    #[must_use]
    pub fn snapshot(&self, log_limit: usize) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.id.clone(),
            config: SnapshotConfig {
                delay: self.spec.delay.as_secs(),
                running: self.running,
                restart_count: self.counters.restarts,
                max_restarts: self.spec.max_restarts,
                credential_mode: self.spec.credential_mode.clone(),
                max_login_retries: self.spec.max_login_retries,
            },
            message_data: MessageData {
                destination: self.spec.destination.clone(),
                messages: self.messages.clone(),
                current_index: self.cursor,
                loop_count: self.stats.loops,
            },
            stats: self.stats.clone(),
            logs: self.log.newest(log_limit),
        }
    }

    // ── Control operations ──────────────────────────────────────────────────

    /// `Created → Authenticating`.
    ///
    /// Fails without side effects beyond a log entry when the task is
    /// already running, the credential is malformed, or there is nothing to
    /// send.
    pub fn start(&mut self, now: DateTime<Utc>) -> crate::Result<Launch> {
        if self.running {
            return Err(crate::LoopError::AlreadyRunning(self.id.clone()));
        }
        if let Err(e) = crate::credentials::validate_credential(&self.spec.credential) {
            self.phase = Phase::Stopped;
            self.record(now, Severity::Error, e.to_string());
            return Err(e);
        }
        if self.messages.is_empty() {
            self.phase = Phase::Stopped;
            self.record(now, Severity::Error, "No messages to send");
            return Err(crate::LoopError::NoMessages);
        }

        self.running = true;
        self.phase = Phase::Authenticating;
        self.counters.login = 0;
        self.stats.start_time = Some(now);
        self.last_activity = now;
        self.record(
            now,
            Severity::Info,
            format!("Task started with {} messages", self.messages.len()),
        );
        Ok(self.launch(Next::now(Op::Login)))
    }

    /// Re-arm a task rebuilt from a snapshot: log in again after `grace`.
    pub fn recover(&mut self, now: DateTime<Utc>, grace: Duration) -> Launch {
        self.running = true;
        self.phase = Phase::Authenticating;
        self.session = None;
        self.counters.login = 0;
        self.counters.send = 0;
        self.last_activity = now;
        self.record(
            now,
            Severity::Info,
            format!("Recovered from snapshot at message {}", self.cursor),
        );
        self.launch(Next::Run {
            after: grace,
            op: Op::Login,
        })
    }

    /// `Sending → Paused`. Fails when the task is not running.
    pub fn pause(&mut self, now: DateTime<Utc>) -> crate::Result<()> {
        if !self.running {
            return Err(crate::LoopError::NotRunning(self.id.clone()));
        }
        self.running = false;
        self.phase = Phase::Paused;
        self.in_flight = None;
        self.epoch += 1;
        self.record(
            now,
            Severity::Info,
            format!("Paused at message {}", self.cursor),
        );
        Ok(())
    }

    /// `Paused → Sending`, continuing from the current cursor.
    pub fn resume(&mut self, now: DateTime<Utc>) -> crate::Result<Launch> {
        if self.running {
            return Err(crate::LoopError::AlreadyRunning(self.id.clone()));
        }
        if self.phase != Phase::Paused || self.session.is_none() {
            return Err(crate::LoopError::NoSession(self.id.clone()));
        }
        self.running = true;
        self.phase = Phase::Sending;
        self.counters.send = 0;
        self.last_activity = now;
        self.record(
            now,
            Severity::Info,
            format!("Resumed at message {}", self.cursor),
        );
        let next = self.send_current(Duration::ZERO);
        Ok(self.launch(next))
    }

    /// Force the restart path, whatever the current phase.
    ///
    /// Used by the health monitor and by an explicit operator restart. A
    /// parked task is brought back to running first; a task whose restart
    /// budget is already spent cannot be restarted.
    pub fn restart(&mut self, now: DateTime<Utc>, reason: &str) -> crate::Result<Launch> {
        if self.counters.restarts > self.spec.max_restarts {
            return Err(crate::LoopError::RestartCapExceeded {
                task_id: self.id.clone(),
                max_restarts: self.spec.max_restarts,
            });
        }
        if let Err(e) = crate::credentials::validate_credential(&self.spec.credential) {
            self.record(now, Severity::Error, e.to_string());
            return Err(e);
        }
        if self.messages.is_empty() {
            return Err(crate::LoopError::NoMessages);
        }
        if !self.running {
            self.running = true;
            self.stats.start_time.get_or_insert(now);
        }
        let next = self.enter_restart(now, reason);
        Ok(self.launch(next))
    }

    /// `* → Stopped`. The caller removes the credential and deregisters.
    pub fn stop(&mut self, now: DateTime<Utc>) {
        self.halt(now, Severity::Info, "Task stopped");
    }

    // ── Transition function ─────────────────────────────────────────────────

    /// Feed an outcome from the driver loop bound to `epoch`.
    pub fn apply(&mut self, epoch: u64, trigger: Trigger, now: DateTime<Utc>) -> Next {
        if epoch != self.epoch {
            return Next::Park;
        }
        match trigger {
            Trigger::LoginSucceeded(session) => self.on_login(session, now),
            Trigger::LoginFailed(err) => self.on_login_failed(err, now),
            Trigger::Delivered => self.on_delivered(now),
            Trigger::DeliveryFailed(err) => self.on_delivery_failed(err, now),
            Trigger::CooldownElapsed => self.on_cooldown(now),
        }
    }

    fn on_login(&mut self, session: Session, now: DateTime<Utc>) -> Next {
        self.record(
            now,
            Severity::Success,
            format!("Logged in ({})", session.label()),
        );
        self.session = Some(session);
        self.stats.active_sessions = 1;
        self.counters.login = 0;
        self.last_activity = now;
        if !self.running {
            return Next::Park;
        }
        self.phase = Phase::Sending;
        self.send_current(Duration::ZERO)
    }

    fn on_login_failed(&mut self, err: ClientError, now: DateTime<Utc>) -> Next {
        if err.is_unexpected() {
            return self.enter_restart(now, &format!("login raised: {}", err.detail));
        }
        if !self.running {
            return Next::Park;
        }
        let attempt = self.counters.login + 1;
        match self
            .policy
            .next_login(&mut self.counters, self.spec.max_login_retries)
        {
            RetryDecision::Retry { after } => {
                self.record(
                    now,
                    Severity::Warning,
                    format!(
                        "Login failed (attempt {attempt}/{}): {}",
                        self.spec.max_login_retries + 1,
                        err.detail
                    ),
                );
                Next::Run {
                    after,
                    op: Op::Login,
                }
            }
            RetryDecision::GiveUp => {
                self.halt(
                    now,
                    Severity::Error,
                    &format!("Login failed after {attempt} attempts: {}", err.detail),
                );
                Next::Park
            }
        }
    }

    fn on_delivered(&mut self, now: DateTime<Utc>) -> Next {
        self.in_flight = None;
        self.stats.sent += 1;
        self.stats.last_success = Some(now);
        self.counters.send = 0;
        self.last_activity = now;
        self.record(
            now,
            Severity::Success,
            format!("Sent message {}/{}", self.cursor + 1, self.messages.len()),
        );
        self.advance(now);
        self.next_message()
    }

    fn on_delivery_failed(&mut self, err: ClientError, now: DateTime<Utc>) -> Next {
        let route = self.in_flight.take().unwrap_or(SendRoute::General);
        if err.is_unexpected() {
            return self.enter_restart(now, &format!("send raised: {}", err.detail));
        }
        if route != SendRoute::SpecialPrimary {
            self.stats.failed += 1;
        }
        if !self.running {
            return Next::Park;
        }

        match self.policy.next_send(&mut self.counters, route) {
            RetryDecision::Retry { after } => {
                let next_route = match route {
                    SendRoute::General => SendRoute::General,
                    SendRoute::SpecialPrimary => SendRoute::SpecialNumeric,
                    SendRoute::SpecialNumeric => SendRoute::SpecialPrimary,
                };
                let severity = if route == SendRoute::SpecialPrimary {
                    Severity::Info
                } else {
                    Severity::Warning
                };
                self.record(
                    now,
                    severity,
                    format!(
                        "Send failed on {route:?} route, retrying: {}",
                        err.detail
                    ),
                );
                self.schedule_send(after, next_route)
            }
            RetryDecision::GiveUp => {
                self.counters.send = 0;
                self.last_activity = now;
                self.record(
                    now,
                    Severity::Error,
                    format!(
                        "Message {}/{} abandoned: {}",
                        self.cursor + 1,
                        self.messages.len(),
                        err.detail
                    ),
                );
                self.advance(now);
                self.next_message()
            }
        }
    }

    fn on_cooldown(&mut self, now: DateTime<Utc>) -> Next {
        if !self.running || self.phase != Phase::Restarting {
            return Next::Park;
        }
        if self.counters.restarts > self.spec.max_restarts {
            self.halt(now, Severity::Error, "Restart limit exceeded");
            return Next::Park;
        }
        self.session = None;
        self.stats.active_sessions = 0;
        self.counters.login = 0;
        self.phase = Phase::Authenticating;
        self.record(now, Severity::Info, "Re-authenticating");
        Next::now(Op::Login)
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    fn launch(&mut self, next: Next) -> Launch {
        self.epoch += 1;
        Launch {
            epoch: self.epoch,
            next,
        }
    }

    fn enter_restart(&mut self, now: DateTime<Utc>, reason: &str) -> Next {
        self.in_flight = None;
        let admitted = self
            .policy
            .admit_restart(&mut self.counters, self.spec.max_restarts);
        self.stats.restarts = self.counters.restarts;
        if !admitted {
            self.halt(
                now,
                Severity::Error,
                &format!(
                    "Restart limit ({}) exceeded, giving up: {reason}",
                    self.spec.max_restarts
                ),
            );
            return Next::Park;
        }
        // The old session is not trusted past this point.
        self.session = None;
        self.stats.active_sessions = 0;
        self.phase = Phase::Restarting;
        self.last_activity = now;
        self.record(
            now,
            Severity::Warning,
            format!(
                "Restarting ({}/{}): {reason}",
                self.counters.restarts, self.spec.max_restarts
            ),
        );
        Next::Run {
            after: self.policy.restart_cooldown,
            op: Op::Reauthenticate,
        }
    }

    fn halt(&mut self, now: DateTime<Utc>, severity: Severity, message: &str) {
        self.running = false;
        self.phase = Phase::Stopped;
        self.session = None;
        self.in_flight = None;
        self.stats.active_sessions = 0;
        self.epoch += 1;
        self.record(now, severity, message);
    }

    /// Move the cursor one step, wrapping into a new cycle at the end.
    fn advance(&mut self, now: DateTime<Utc>) {
        self.cursor += 1;
        if self.cursor >= self.messages.len() {
            self.cursor = 0;
            self.stats.loops += 1;
            self.record(
                now,
                Severity::Info,
                format!("Cycle {} complete", self.stats.loops),
            );
        }
    }

    fn next_message(&mut self) -> Next {
        if !self.running {
            return Next::Park;
        }
        self.send_current(self.spec.delay)
    }

    fn send_current(&mut self, after: Duration) -> Next {
        let route = if is_special_destination(&self.spec.destination) {
            SendRoute::SpecialPrimary
        } else {
            SendRoute::General
        };
        self.schedule_send(after, route)
    }

    fn schedule_send(&mut self, after: Duration, route: SendRoute) -> Next {
        let Some(text) = self.messages.get(self.cursor).cloned() else {
            return Next::Park;
        };
        let destination = self.spec.destination.clone();
        let (body, destination) = match route {
            SendRoute::General => (MessageBody::Text(text), Destination::Id(destination)),
            SendRoute::SpecialPrimary => (
                MessageBody::Structured { body: text },
                Destination::Id(destination),
            ),
            SendRoute::SpecialNumeric => {
                let numeric = destination.parse::<u64>().unwrap_or_default();
                (
                    MessageBody::Structured { body: text },
                    Destination::Numeric(numeric),
                )
            }
        };
        self.in_flight = Some(route);
        Next::Run {
            after,
            op: Op::Send(SendAttempt {
                body,
                destination,
                route,
            }),
        }
    }
}
