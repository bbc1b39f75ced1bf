//! End-to-end task lifecycle through the public manager API.

use crate::helpers::{FakeClient, manager, request, settle, temp_config};
use sendloop::client::{ClientErrorKind, Destination, MessageBody};
use sendloop::notify::{BroadcastSink, TaskEvent};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn task_cycles_through_messages_with_fixed_delay() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Arc::new(FakeClient::default());
    let sink = Arc::new(BroadcastSink::default());
    let manager = manager(temp_config(dir.path()), &client, &sink);

    let id = manager.create_task(&request("a\n\n  b  \r\n", "thread-9")).unwrap();
    settle().await;
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    assert_eq!(
        client.sent_texts(),
        ["Hey a !", "Hey b !", "Hey a !", "Hey b !"]
    );
    let task = manager.get_task(&id).unwrap();
    assert_eq!(task.stats.sent, 4);
    assert_eq!(task.stats.loops, 2);
    assert_eq!(task.message_data.current_index, 0);
    assert_eq!(client.logins(), 1);

    let log_file = dir.path().join("logs").join(format!("task_{id}.log"));
    let contents = std::fs::read_to_string(log_file).unwrap();
    assert!(contents.contains("[SUCCESS]"));
}

#[tokio::test(start_paused = true)]
async fn pause_then_resume_continues_at_cursor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Arc::new(FakeClient::default());
    let sink = Arc::new(BroadcastSink::default());
    let manager = manager(temp_config(dir.path()), &client, &sink);

    let id = manager.create_task(&request("one\ntwo\nthree", "t")).unwrap();
    settle().await;
    manager.pause_task(&id).unwrap();
    assert!(manager.pause_task(&id).is_err());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(client.sent_texts(), ["Hey one !"]);

    manager.resume_task(&id).unwrap();
    settle().await;
    assert_eq!(client.sent_texts(), ["Hey one !", "Hey two !"]);
    assert!(manager.resume_task(&id).is_err());
}

#[tokio::test(start_paused = true)]
async fn failed_message_is_abandoned_after_retries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Arc::new(FakeClient::default());
    let sink = Arc::new(BroadcastSink::default());
    let config = temp_config(dir.path());
    let retries = config.retry.send_retries as usize;
    let manager = manager(config, &client, &sink);

    client.fail_next_sends(ClientErrorKind::Rejected, retries + 1);
    let id = manager.create_task(&request("first\nsecond", "t")).unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    let task = manager.get_task(&id).unwrap();
    assert_eq!(task.stats.failed, (retries + 1) as u64);
    assert_eq!(client.sent_texts()[0], "Hey second !");
    assert!(task.config.running);
}

#[tokio::test(start_paused = true)]
async fn fifteen_digit_destination_uses_structured_body() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Arc::new(FakeClient::default());
    let sink = Arc::new(BroadcastSink::default());
    let manager = manager(temp_config(dir.path()), &client, &sink);

    client.fail_next_sends(ClientErrorKind::Rejected, 1);
    manager
        .create_task(&request("hello", "100012345678901"))
        .unwrap();
    settle().await;

    let sent = client.sent();
    assert_eq!(
        sent[0],
        (
            MessageBody::Structured {
                body: "Hey hello !".to_owned()
            },
            Destination::Numeric(100_012_345_678_901)
        )
    );
}

#[tokio::test(start_paused = true)]
async fn stop_publishes_and_forgets_task() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Arc::new(FakeClient::default());
    let sink = Arc::new(BroadcastSink::default());
    let mut events = sink.subscribe();
    let manager = manager(temp_config(dir.path()), &client, &sink);

    let id = manager.create_task(&request("x", "t")).unwrap();
    settle().await;
    manager.stop_task(&id).unwrap();

    assert!(manager.list_tasks().is_empty());
    assert!(!dir.path().join("credentials").join(format!("{id}.txt")).exists());

    let mut saw_started = false;
    let mut saw_stopped = false;
    while let Ok(n) = events.try_recv() {
        match n.event {
            TaskEvent::TaskStarted { .. } => saw_started = true,
            TaskEvent::TaskStopped { task_id } => {
                assert_eq!(task_id, id);
                saw_stopped = true;
            }
            _ => {}
        }
    }
    assert!(saw_started && saw_stopped);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(client.sent_texts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unexpected_failure_restarts_with_fresh_login() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Arc::new(FakeClient::default());
    let sink = Arc::new(BroadcastSink::default());
    let config = temp_config(dir.path());
    let cooldown = config.retry.restart_cooldown();
    let manager = manager(config, &client, &sink);

    client.fail_next_sends(ClientErrorKind::Unexpected, 1);
    let id = manager.create_task(&request("x", "t")).unwrap();
    settle().await;
    assert_eq!(manager.get_task(&id).unwrap().stats.restarts, 1);

    tokio::time::sleep(cooldown).await;
    settle().await;
    assert_eq!(client.logins(), 2);
    assert_eq!(client.sent_texts(), ["Hey x !"]);
}
