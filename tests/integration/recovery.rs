//! Snapshot persistence and crash recovery.

use crate::helpers::{FakeClient, manager, request, settle, temp_config};
use sendloop::notify::BroadcastSink;
use sendloop::persistence::SnapshotStore;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn recovered_task_resumes_after_grace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = temp_config(dir.path());
    let grace = Duration::from_secs(config.persistence.recovery_grace_secs);

    // First process: run a little, snapshot, shut down.
    let first_client = Arc::new(FakeClient::default());
    let sink = Arc::new(BroadcastSink::default());
    let first = manager(config.clone(), &first_client, &sink);
    let id = first.create_task(&request("a\nb\nc", "t")).unwrap();
    settle().await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(first_client.sent_texts(), ["Hey a !", "Hey b !"]);
    first.shutdown();

    let saved = SnapshotStore::new(dir.path().join("tasks.json")).load().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].message_data.current_index, 2);
    assert!(saved[0].logs.len() <= config.persistence.log_tail);

    // Second process: recover from the snapshot.
    let second_client = Arc::new(FakeClient::default());
    let second = manager(config, &second_client, &sink);
    assert_eq!(second.recover(), 1);

    let task = second.get_task(&id).unwrap();
    assert!(task.config.running);
    assert_eq!(task.stats.sent, 2);
    assert_eq!(task.stats.active_sessions, 0);

    // Everything but the session count and the new log entry round-trips.
    let mut expected_stats = saved[0].stats.clone();
    expected_stats.active_sessions = 0;
    assert_eq!(task.task_id, saved[0].task_id);
    assert_eq!(task.config, saved[0].config);
    assert_eq!(task.message_data, saved[0].message_data);
    assert_eq!(task.stats, expected_stats);
    assert!(task.stats.last_success.is_some());
    assert!(task.logs[0].message.starts_with("Recovered"));
    let carried = &task.logs[1..];
    assert!(!carried.is_empty());
    assert_eq!(carried, &saved[0].logs[..carried.len()]);

    // Nothing happens before the grace delay.
    tokio::time::sleep(grace - Duration::from_millis(100)).await;
    assert_eq!(second_client.logins(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(second_client.logins(), 1);
    assert_eq!(second_client.sent_texts(), ["Hey c !"]);
    assert_eq!(second.get_task(&id).unwrap().stats.loops, 1);
}

#[tokio::test(start_paused = true)]
async fn recovery_without_credential_keeps_task_halted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = temp_config(dir.path());
    let client = Arc::new(FakeClient::default());
    let sink = Arc::new(BroadcastSink::default());

    let first = manager(config.clone(), &client, &sink);
    let id = first.create_task(&request("a", "t")).unwrap();
    settle().await;
    first.save_snapshot().unwrap();
    std::fs::remove_file(dir.path().join("credentials").join(format!("{id}.txt"))).unwrap();

    let second = manager(config, &client, &sink);
    assert_eq!(second.recover(), 0);
    let task = second.get_task(&id).unwrap();
    assert!(!task.config.running);
    assert!(task.logs[0].message.contains("Credential missing"));
}

#[tokio::test(start_paused = true)]
async fn corrupt_snapshot_yields_empty_registry() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("tasks.json"), b"\x00garbage").unwrap();

    let client = Arc::new(FakeClient::default());
    let sink = Arc::new(BroadcastSink::default());
    let manager = manager(temp_config(dir.path()), &client, &sink);
    assert_eq!(manager.recover(), 0);
    assert!(manager.list_tasks().is_empty());
}
