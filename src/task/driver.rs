//! Async driver for one task.
//!
//! A driver loop executes the steps returned by [`TaskMachine`]: it waits
//! out the step's delay, performs the client call, and feeds the outcome
//! back through [`TaskMachine::apply`]. Stop, pause and restart cancel the
//! loop's token; a cancelled loop returns without touching the task.
//!
//! [`TaskMachine`]: crate::task::TaskMachine
//! [`TaskMachine::apply`]: crate::task::TaskMachine::apply

use crate::client::{ClientError, MessengerClient, Session};
use crate::notify::{NotificationSink, TaskEvent};
use crate::registry::TaskHandle;
use crate::task::log::{LogEntry, Severity, TaskLogStore};
use crate::task::machine::{Launch, Next, Op, Trigger};
use crate::task::snapshot::TaskSnapshot;
use chrono::Utc;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Collaborators shared by every driver loop.
#[derive(Clone)]
pub struct DriverContext {
    pub client: Arc<dyn MessengerClient>,
    pub sink: Arc<dyn NotificationSink>,
    pub log_store: Arc<dyn TaskLogStore>,
    /// Log entries included in published task views.
    pub log_tail: usize,
}

impl DriverContext {
    /// Hand drained log entries to the durable store and the sink, then
    /// publish the updated task view.
    pub fn flush(&self, task_id: &str, entries: Vec<LogEntry>, view: Option<TaskSnapshot>) {
        for entry in entries {
            if let Err(e) = self.log_store.append(task_id, &entry) {
                tracing::warn!(task_id, error = %e, "failed to append task log");
            }
            match entry.severity {
                Severity::Error => tracing::error!(task_id, "{}", entry.message),
                Severity::Warning => tracing::warn!(task_id, "{}", entry.message),
                Severity::Info | Severity::Success => {
                    tracing::debug!(task_id, "{}", entry.message);
                }
            }
            self.sink.publish(
                task_id,
                TaskEvent::Log {
                    message: entry.message,
                    severity: entry.severity,
                },
            );
        }
        if let Some(view) = view {
            self.sink.publish(
                task_id,
                TaskEvent::TaskUpdated {
                    task_id: task_id.to_owned(),
                    task: Box::new(view),
                },
            );
        }
    }

    /// Drain the task's outbox and publish, outside the task lock.
    pub fn flush_handle(&self, handle: &TaskHandle) {
        let (entries, view) = {
            let mut machine = handle.lock();
            (machine.take_outbox(), machine.snapshot(self.log_tail))
        };
        self.flush(handle.id(), entries, Some(view));
    }
}

impl std::fmt::Debug for DriverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverContext")
            .field("log_tail", &self.log_tail)
            .finish_non_exhaustive()
    }
}

/// Replace the task's driver loop with one executing `launch`.
///
/// Any previous loop is cancelled first. Returns `None` when the launch is
/// parked and no loop is needed.
pub fn spawn(
    handle: Arc<TaskHandle>,
    ctx: DriverContext,
    launch: Launch,
) -> Option<JoinHandle<()>> {
    let token = handle.rearm();
    ctx.flush_handle(&handle);
    if launch.next == Next::Park {
        return None;
    }
    Some(tokio::spawn(run(handle, ctx, launch, token)))
}

async fn run(handle: Arc<TaskHandle>, ctx: DriverContext, launch: Launch, token: CancellationToken) {
    let epoch = launch.epoch;
    let mut next = launch.next;

    while let Next::Run { after, op } = next {
        if !after.is_zero() {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(after) => {}
            }
        }

        let trigger = match op {
            Op::Login => {
                let (credential, options) = {
                    let machine = handle.lock();
                    (machine.credential().to_owned(), machine.login_options())
                };
                match call(&token, ctx.client.login(&credential, &options)).await {
                    None => return,
                    Some(Ok(session)) => Trigger::LoginSucceeded(session),
                    Some(Err(e)) => Trigger::LoginFailed(e),
                }
            }
            Op::Send(attempt) => {
                let session = handle.lock().session().cloned();
                let Some(session) = session else {
                    return;
                };
                match call(
                    &token,
                    ctx.client.send(&session, attempt.body, attempt.destination),
                )
                .await
                {
                    None => return,
                    Some(Ok(())) => Trigger::Delivered,
                    Some(Err(e)) => Trigger::DeliveryFailed(e),
                }
            }
            Op::Reauthenticate => Trigger::CooldownElapsed,
        };

        if token.is_cancelled() {
            return;
        }

        let session = match &trigger {
            Trigger::LoginSucceeded(session) => Some(session.clone()),
            _ => None,
        };
        next = {
            let mut machine = handle.lock();
            machine.apply(epoch, trigger, Utc::now())
        };
        ctx.flush_handle(&handle);

        if let Some(session) = session {
            tokio::spawn(lookup_profile(
                Arc::clone(&handle),
                ctx.clone(),
                session,
                token.clone(),
            ));
        }
    }
}

/// Run a client call unless the loop is cancelled first. A panic inside the
/// client is reported as an unexpected failure.
async fn call<T, F>(token: &CancellationToken, fut: F) -> Option<Result<T, ClientError>>
where
    F: Future<Output = Result<T, ClientError>>,
{
    tokio::select! {
        () = token.cancelled() => None,
        result = AssertUnwindSafe(fut).catch_unwind() => Some(match result {
            Ok(outcome) => outcome,
            Err(panic) => Err(ClientError::unexpected(panic_message(panic.as_ref()))),
        }),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("client panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("client panicked: {s}")
    } else {
        "client panicked".to_owned()
    }
}

/// Best-effort identity lookup after a login. Failures are only logged.
async fn lookup_profile(
    handle: Arc<TaskHandle>,
    ctx: DriverContext,
    session: Session,
    token: CancellationToken,
) {
    let id = match call(&token, ctx.client.identity(&session)).await {
        Some(Ok(id)) => id,
        Some(Err(e)) => {
            tracing::debug!(task_id = handle.id(), error = %e, "identity lookup failed");
            return;
        }
        None => return,
    };
    let message = match call(&token, ctx.client.profile(&session, &id)).await {
        Some(Ok(profile)) => match profile.name {
            Some(name) => format!("Logged in as {name} ({id})"),
            None => format!("Logged in as {id}"),
        },
        Some(Err(e)) => {
            tracing::debug!(task_id = handle.id(), error = %e, "profile lookup failed");
            format!("Logged in as {id}")
        }
        None => return,
    };
    handle.lock().record(Utc::now(), Severity::Info, message);
    ctx.flush_handle(&handle);
}
