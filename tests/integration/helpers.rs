//! Shared helpers for integration tests.

use async_trait::async_trait;
use sendloop::client::{
    ClientError, ClientErrorKind, Destination, LoginOptions, MessageBody, MessengerClient,
    Profile, Session,
};
use sendloop::notify::BroadcastSink;
use sendloop::{SendloopConfig, TaskManager, TaskRequest};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Client with queued send failures; logins always succeed.
#[derive(Debug, Default)]
pub(crate) struct FakeClient {
    send_failures: Mutex<VecDeque<ClientErrorKind>>,
    logins: Mutex<usize>,
    sent: Mutex<Vec<(MessageBody, Destination)>>,
}

impl FakeClient {
    pub(crate) fn fail_next_sends(&self, kind: ClientErrorKind, count: usize) {
        let mut queue = self.send_failures.lock().unwrap();
        queue.extend(std::iter::repeat_n(kind, count));
    }

    pub(crate) fn logins(&self) -> usize {
        *self.logins.lock().unwrap()
    }

    /// Successful deliveries, in order.
    pub(crate) fn sent(&self) -> Vec<(MessageBody, Destination)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|(body, _)| body.text().to_owned())
            .collect()
    }
}

#[async_trait]
impl MessengerClient for FakeClient {
    async fn login(&self, _credential: &str, _options: &LoginOptions) -> Result<Session, ClientError> {
        *self.logins.lock().unwrap() += 1;
        Ok(Session::new("fake", ()))
    }

    async fn send(
        &self,
        _session: &Session,
        message: MessageBody,
        destination: Destination,
    ) -> Result<(), ClientError> {
        let failure = self.send_failures.lock().unwrap().pop_front();
        if let Some(kind) = failure {
            return Err(ClientError::new(kind, "fake failure"));
        }
        self.sent.lock().unwrap().push((message, destination));
        Ok(())
    }

    async fn identity(&self, _session: &Session) -> Result<String, ClientError> {
        Err(ClientError::rejected("no identity"))
    }

    async fn profile(&self, _session: &Session, id: &str) -> Result<Profile, ClientError> {
        Ok(Profile {
            id: id.to_owned(),
            name: None,
        })
    }
}

/// Config with every path under `dir`.
pub(crate) fn temp_config(dir: &Path) -> SendloopConfig {
    let mut config = SendloopConfig::default();
    config.persistence.snapshot_path = Some(dir.join("tasks.json"));
    config.persistence.credentials_dir = Some(dir.join("credentials"));
    config.persistence.logs_dir = Some(dir.join("logs"));
    config
}

pub(crate) fn manager(
    config: SendloopConfig,
    client: &Arc<FakeClient>,
    sink: &Arc<BroadcastSink>,
) -> Arc<TaskManager> {
    Arc::new(TaskManager::new(
        config,
        Arc::clone(client) as Arc<dyn MessengerClient>,
        Arc::clone(sink) as Arc<dyn sendloop::NotificationSink>,
    ))
}

pub(crate) fn request(lines: &str, destination: &str) -> TaskRequest {
    TaskRequest {
        credential: "c_user=100; xs=token".to_owned(),
        messages: Some(lines.to_owned()),
        leading_name: Some("Hey".to_owned()),
        trailing_name: Some("!".to_owned()),
        destination: destination.to_owned(),
        delay_secs: Some(2),
        ..TaskRequest::default()
    }
}

/// Let spawned driver loops run without advancing past any real delay.
pub(crate) async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
}
