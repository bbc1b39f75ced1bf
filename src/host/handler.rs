//! Routes bridge commands to the [`TaskManager`].

use crate::host::contract::{
    CommandEnvelope, CommandName, ContractError, ContractErrorKind, ResponseEnvelope,
};
use crate::manager::TaskManager;
use crate::task::TaskRequest;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskIdPayload {
    task_id: String,
}

/// Executes one command envelope against the manager.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    manager: Arc<TaskManager>,
}

impl CommandHandler {
    pub fn new(manager: Arc<TaskManager>) -> Self {
        Self { manager }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    /// Handle a command. Failures become error responses; this never fails.
    pub fn handle(&self, envelope: CommandEnvelope) -> ResponseEnvelope {
        if let Err(e) = envelope.validate() {
            return ResponseEnvelope::error(envelope.request_id, e.to_string());
        }
        let request_id = envelope.request_id.clone();
        match self.dispatch(envelope) {
            Ok(payload) => ResponseEnvelope::ok(request_id, payload),
            Err(message) => {
                tracing::debug!(%request_id, %message, "command failed");
                ResponseEnvelope::error(request_id, message)
            }
        }
    }

    fn dispatch(&self, envelope: CommandEnvelope) -> Result<serde_json::Value, String> {
        let manager = &self.manager;
        match envelope.command {
            CommandName::HostPing => Ok(json!({ "pong": true })),
            CommandName::HostVersion => Ok(json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            })),
            CommandName::RuntimeStop => Ok(json!({ "stopping": true })),
            CommandName::TaskCreate => {
                let request: TaskRequest = parse_payload(envelope.payload)?;
                let task_id = manager.create_task(&request).map_err(|e| e.to_string())?;
                Ok(json!({ "taskId": task_id }))
            }
            CommandName::TaskStop => {
                let p: TaskIdPayload = parse_payload(envelope.payload)?;
                manager.stop_task(&p.task_id).map_err(|e| e.to_string())?;
                Ok(json!({ "taskId": p.task_id }))
            }
            CommandName::TaskPause => {
                let p: TaskIdPayload = parse_payload(envelope.payload)?;
                manager.pause_task(&p.task_id).map_err(|e| e.to_string())?;
                Ok(json!({ "taskId": p.task_id }))
            }
            CommandName::TaskResume => {
                let p: TaskIdPayload = parse_payload(envelope.payload)?;
                manager.resume_task(&p.task_id).map_err(|e| e.to_string())?;
                Ok(json!({ "taskId": p.task_id }))
            }
            CommandName::TaskRestart => {
                let p: TaskIdPayload = parse_payload(envelope.payload)?;
                manager.restart_task(&p.task_id).map_err(|e| e.to_string())?;
                Ok(json!({ "taskId": p.task_id }))
            }
            CommandName::TaskGet => {
                let p: TaskIdPayload = parse_payload(envelope.payload)?;
                let task = manager.get_task(&p.task_id).map_err(|e| e.to_string())?;
                to_value(&task)
            }
            CommandName::TaskList => to_value(&json!({ "tasks": manager.list_tasks() })),
            CommandName::StatsGet => to_value(&manager.stats()),
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    payload: serde_json::Value,
) -> Result<T, String> {
    serde_json::from_value(payload).map_err(|e| {
        ContractError::new(ContractErrorKind::InvalidPayload, e.to_string()).to_string()
    })
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(|e| format!("cannot serialize response: {e}"))
}
