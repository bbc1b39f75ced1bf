//! Stdin/stdout JSON bridge for the control surface.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages from stdin,
//! dispatches them through the [`CommandHandler`], and writes
//! `ResponseEnvelope` and `EventEnvelope` messages as newline-delimited
//! JSON to stdout.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::host::handler::CommandHandler;
use crate::notify::{Notification, TaskEvent};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast};

/// Run the bridge on the process stdin/stdout until stdin closes or a
/// `runtime.stop` command is received.
pub async fn run_stdio_bridge(
    handler: CommandHandler,
    events: broadcast::Receiver<Notification>,
) -> crate::Result<()> {
    run_bridge(
        handler,
        events,
        BufReader::new(tokio::io::stdin()),
        BufWriter::new(tokio::io::stdout()),
    )
    .await
}

/// Run the bridge over arbitrary streams.
///
/// Two tasks operate in parallel:
///
/// 1. **Reader** -- reads newline-delimited JSON, dispatches each
///    `CommandEnvelope`, and writes the resulting `ResponseEnvelope`.
/// 2. **Event forwarder** -- receives notifications and writes them as
///    `EventEnvelope` lines.
///
/// The bridge exits when the reader finishes.
pub async fn run_bridge<R, W>(
    handler: CommandHandler,
    mut events: broadcast::Receiver<Notification>,
    reader: R,
    writer: W,
) -> crate::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(writer));

    let event_writer = Arc::clone(&writer);
    let event_handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(notification) => {
                    let envelope = event_envelope(&notification);
                    match serde_json::to_string(&envelope) {
                        Ok(json) => {
                            let mut w = event_writer.lock().await;
                            if let Err(e) = write_line(&mut *w, &json).await {
                                tracing::warn!(
                                    error = %e,
                                    "failed to write event envelope; stopping event forwarder"
                                );
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("event channel closed; stopping event forwarder");
                    break;
                }
            }
        }
    });

    let reader_result = run_reader(&handler, reader, Arc::clone(&writer)).await;

    event_handle.abort();
    let _ = event_handle.await;

    reader_result
}

async fn run_reader<R, W>(
    handler: &CommandHandler,
    mut reader: R,
    writer: Arc<Mutex<W>>,
) -> crate::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| crate::LoopError::Bridge(format!("failed to read from stdin: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("stdin closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse command envelope");
                let response = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                write_response(&writer, &response).await?;
                continue;
            }
        };

        let is_stop = envelope.command == CommandName::RuntimeStop;
        let response = handler.handle(envelope);
        write_response(&writer, &response).await?;

        if is_stop {
            tracing::info!("runtime.stop received; shutting down bridge");
            break;
        }
    }

    Ok(())
}

fn event_envelope(notification: &Notification) -> EventEnvelope {
    let name = match &notification.event {
        TaskEvent::Log { .. } => "task.log",
        TaskEvent::TaskStarted { .. } => "task.started",
        TaskEvent::TaskUpdated { .. } => "task.updated",
        TaskEvent::TaskStopped { .. } => "task.stopped",
    };
    let payload = serde_json::to_value(notification).unwrap_or(serde_json::Value::Null);
    EventEnvelope::new(uuid::Uuid::new_v4().to_string(), name, payload)
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &Mutex<W>,
    response: &ResponseEnvelope,
) -> crate::Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| crate::LoopError::Bridge(format!("failed to serialize response: {e}")))?;
    let mut w = writer.lock().await;
    write_line(&mut *w, &json).await
}

/// Write a single JSON line and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, json: &str) -> crate::Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| crate::LoopError::Bridge(format!("failed to write to stdout: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| crate::LoopError::Bridge(format!("failed to write newline to stdout: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| crate::LoopError::Bridge(format!("failed to flush stdout: {e}")))?;
    Ok(())
}
