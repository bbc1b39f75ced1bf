//! Shared test utilities used across multiple test modules.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::client::{
    ClientError, ClientErrorKind, Destination, LoginOptions, MessageBody, MessengerClient,
    Profile, Session,
};
use crate::task::log::{LogEntry, TaskLogStore};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Scripted result of one login call.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Ok,
    Fail(ClientErrorKind),
}

/// Scripted result of one send call.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Ok,
    Fail(ClientErrorKind),
    Panic,
}

/// A delivered message as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub body: MessageBody,
    pub destination: Destination,
}

/// Client whose outcomes are queued up front. Once a queue runs dry every
/// call succeeds.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    logins: Mutex<VecDeque<LoginOutcome>>,
    sends: Mutex<VecDeque<SendOutcome>>,
    login_calls: Mutex<usize>,
    attempts: Mutex<Vec<Delivery>>,
    delivered: Mutex<Vec<Delivery>>,
}

impl ScriptedClient {
    pub fn push_login(&self, outcome: LoginOutcome) {
        self.logins.lock().expect("logins").push_back(outcome);
    }

    pub fn push_send(&self, outcome: SendOutcome) {
        self.sends.lock().expect("sends").push_back(outcome);
    }

    pub fn login_count(&self) -> usize {
        *self.login_calls.lock().expect("login calls")
    }

    /// Every send call, successful or not.
    pub fn attempts(&self) -> Vec<Delivery> {
        self.attempts.lock().expect("attempts").clone()
    }

    /// Text of every successful delivery, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.delivered
            .lock()
            .expect("delivered")
            .iter()
            .map(|d| d.body.text().to_owned())
            .collect()
    }
}

#[async_trait]
impl MessengerClient for ScriptedClient {
    async fn login(
        &self,
        _credential: &str,
        _options: &LoginOptions,
    ) -> Result<Session, ClientError> {
        *self.login_calls.lock().expect("login calls") += 1;
        let outcome = self.logins.lock().expect("logins").pop_front();
        match outcome.unwrap_or(LoginOutcome::Ok) {
            LoginOutcome::Ok => Ok(Session::new("scripted", ())),
            LoginOutcome::Fail(kind) => Err(ClientError::new(kind, "scripted login failure")),
        }
    }

    async fn send(
        &self,
        _session: &Session,
        message: MessageBody,
        destination: Destination,
    ) -> Result<(), ClientError> {
        let delivery = Delivery {
            body: message,
            destination,
        };
        self.attempts
            .lock()
            .expect("attempts")
            .push(delivery.clone());
        let outcome = self.sends.lock().expect("sends").pop_front();
        match outcome.unwrap_or(SendOutcome::Ok) {
            SendOutcome::Ok => {
                self.delivered.lock().expect("delivered").push(delivery);
                Ok(())
            }
            SendOutcome::Fail(kind) => Err(ClientError::new(kind, "scripted send failure")),
            SendOutcome::Panic => panic!("scripted send panic"),
        }
    }

    async fn identity(&self, _session: &Session) -> Result<String, ClientError> {
        Ok("100".to_owned())
    }

    async fn profile(&self, _session: &Session, id: &str) -> Result<Profile, ClientError> {
        Ok(Profile {
            id: id.to_owned(),
            name: Some("Scripted".to_owned()),
        })
    }
}

/// Durable log store that keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    entries: Mutex<Vec<(String, LogEntry)>>,
}

impl MemoryLogStore {
    pub fn entries_for(&self, task_id: &str) -> Vec<LogEntry> {
        self.entries
            .lock()
            .expect("entries")
            .iter()
            .filter(|(id, _)| id == task_id)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

impl TaskLogStore for MemoryLogStore {
    fn append(&self, task_id: &str, entry: &LogEntry) -> crate::Result<()> {
        self.entries
            .lock()
            .expect("entries")
            .push((task_id.to_owned(), entry.clone()));
        Ok(())
    }
}
