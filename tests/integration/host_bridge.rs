//! Control bridge driven over in-memory streams.

use crate::helpers::{FakeClient, manager, temp_config};
use sendloop::host::contract::{EventEnvelope, ResponseEnvelope};
use sendloop::host::handler::CommandHandler;
use sendloop::host::stdio::run_bridge;
use sendloop::notify::BroadcastSink;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::test]
async fn create_and_stop_over_the_bridge() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Arc::new(FakeClient::default());
    let sink = Arc::new(BroadcastSink::default());
    let manager = manager(temp_config(dir.path()), &client, &sink);
    let handler = CommandHandler::new(Arc::clone(&manager));

    let (mut cmd_tx, cmd_rx) = tokio::io::duplex(16 * 1024);
    let (out_tx, out_rx) = tokio::io::duplex(256 * 1024);
    let bridge = tokio::spawn(run_bridge(
        handler,
        sink.subscribe(),
        BufReader::new(cmd_rx),
        out_tx,
    ));
    let mut lines = BufReader::new(out_rx).lines();

    let create = serde_json::json!({
        "v": 1,
        "request_id": "create-1",
        "command": "task.create",
        "payload": {
            "credential": "c_user=1; xs=2",
            "messages": "ping",
            "leadingName": "a",
            "trailingName": "b",
            "threadID": "42"
        }
    });
    cmd_tx
        .write_all(format!("{create}\n").as_bytes())
        .await
        .unwrap();

    let mut task_id = None;
    let mut saw_event = false;
    while task_id.is_none() || !saw_event {
        let line = lines.next_line().await.unwrap().expect("bridge output");
        if let Ok(resp) = serde_json::from_str::<ResponseEnvelope>(&line) {
            assert!(resp.ok, "{:?}", resp.error);
            task_id = resp.payload["taskId"].as_str().map(str::to_owned);
        } else {
            let event: EventEnvelope = serde_json::from_str(&line).unwrap();
            saw_event |= event.event.starts_with("task.");
        }
    }

    let stop = serde_json::json!({
        "v": 1,
        "request_id": "stop-1",
        "command": "runtime.stop"
    });
    cmd_tx.write_all(format!("{stop}\n").as_bytes()).await.unwrap();
    bridge.await.unwrap().unwrap();

    assert_eq!(manager.list_tasks().len(), 1);
    manager.stop_task(task_id.as_deref().unwrap()).unwrap();
}
