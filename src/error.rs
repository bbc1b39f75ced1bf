//! Error types for the sendloop scheduler.

/// Top-level error type for task lifecycle management.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// Credential blob lacks the session identity or session token marker.
    #[error("invalid credential format: {0}")]
    InvalidCredentialFormat(String),

    /// The rendered message sequence is empty, so the task cannot start.
    #[error("no messages to send")]
    NoMessages,

    /// No task is registered under the given id.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// The task is already running.
    #[error("task {0} is already running")]
    AlreadyRunning(String),

    /// The task is not running (pause on a paused or halted task).
    #[error("task {0} is not running")]
    NotRunning(String),

    /// The task holds no cached session to resume with.
    #[error("task {0} has no active session")]
    NoSession(String),

    /// The lifetime restart budget of a task is spent.
    #[error("task {task_id} exceeded its restart limit ({max_restarts})")]
    RestartCapExceeded {
        /// Task whose budget ran out.
        task_id: String,
        /// Configured cap.
        max_restarts: u32,
    },

    /// Submitted task input failed validation.
    #[error("invalid task input: {0}")]
    InvalidInput(String),

    /// Delegated client failure surfaced to a caller.
    #[error("client error: {0}")]
    Client(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Snapshot, credential or task log storage error.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Control bridge error (stdin/stdout framing).
    #[error("bridge error: {0}")]
    Bridge(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, LoopError>;
