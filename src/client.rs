//! Delegated messaging client contract.
//!
//! The scheduler never speaks the remote platform's protocol. Embedders
//! provide a [`MessengerClient`] that performs login and delivery; the
//! scheduler only decides when to call it and what to do with the outcome.

use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Opaque session handle returned by a successful login.
///
/// The payload belongs to the client implementation; the scheduler only
/// stores the handle and passes it back on each send.
#[derive(Clone)]
pub struct Session {
    label: String,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Session {
    pub fn new<T: Any + Send + Sync>(label: impl Into<String>, value: T) -> Self {
        Self {
            label: label.into(),
            inner: Arc::new(value),
        }
    }

    /// Short human-readable description, safe to log.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Borrow the client-specific payload.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("label", &self.label).finish()
    }
}

/// Options passed alongside the credential on login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginOptions {
    /// How the credential blob was entered (free text, forwarded as-is).
    pub credential_mode: String,
}

/// Outbound message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Plain string message (the client's default encoding).
    Text(String),
    /// Structured body wrapper, used where plain strings are rejected.
    Structured { body: String },
}

impl MessageBody {
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Structured { body } => body,
        }
    }
}

/// Delivery destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// String conversation identifier.
    Id(String),
    /// Numeric-typed identifier.
    Numeric(u64),
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Numeric(id) => write!(f, "{id}"),
        }
    }
}

/// Minimal profile information from a user lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub name: Option<String>,
}

/// Client error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    /// The platform refused the request through the normal error channel.
    Rejected,
    /// The call did not complete in time.
    Timeout,
    /// The client failed abnormally (panic, broken session, protocol error).
    Unexpected,
}

/// Error returned by a [`MessengerClient`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    pub kind: ClientErrorKind,
    pub detail: String,
}

impl ClientError {
    #[must_use]
    pub fn new(kind: ClientErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn rejected(detail: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Rejected, detail)
    }

    #[must_use]
    pub fn unexpected(detail: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Unexpected, detail)
    }

    /// Whether this failure bypasses local retry and forces a restart.
    #[must_use]
    pub fn is_unexpected(&self) -> bool {
        self.kind == ClientErrorKind::Unexpected
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for ClientError {}

/// Delegated messaging client. New platforms only need to implement this trait.
#[async_trait]
pub trait MessengerClient: Send + Sync {
    /// Authenticate with a raw credential blob.
    async fn login(&self, credential: &str, options: &LoginOptions)
    -> Result<Session, ClientError>;

    /// Deliver one message to `destination`.
    async fn send(
        &self,
        session: &Session,
        message: MessageBody,
        destination: Destination,
    ) -> Result<(), ClientError>;

    /// Identifier of the account behind `session`.
    async fn identity(&self, session: &Session) -> Result<String, ClientError>;

    /// Profile lookup for an account identifier.
    async fn profile(&self, session: &Session, id: &str) -> Result<Profile, ClientError>;
}

/// Client that accepts every login and logs messages instead of delivering them.
///
/// Used by the host binary when no platform client is plugged in.
#[derive(Debug, Clone, Default)]
pub struct DryRunClient;

#[async_trait]
impl MessengerClient for DryRunClient {
    async fn login(
        &self,
        credential: &str,
        options: &LoginOptions,
    ) -> Result<Session, ClientError> {
        tracing::info!(
            credential_len = credential.len(),
            mode = %options.credential_mode,
            "dry-run login"
        );
        Ok(Session::new("dry-run", ()))
    }

    async fn send(
        &self,
        _session: &Session,
        message: MessageBody,
        destination: Destination,
    ) -> Result<(), ClientError> {
        tracing::info!(%destination, text = message.text(), "dry-run send");
        Ok(())
    }

    async fn identity(&self, _session: &Session) -> Result<String, ClientError> {
        Ok("dry-run".to_owned())
    }

    async fn profile(&self, _session: &Session, id: &str) -> Result<Profile, ClientError> {
        Ok(Profile {
            id: id.to_owned(),
            name: Some("Dry Run".to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn session_downcasts_to_payload() {
        let session = Session::new("acct-1", 42_u32);
        assert_eq!(session.label(), "acct-1");
        assert_eq!(session.downcast_ref::<u32>(), Some(&42));
        assert!(session.downcast_ref::<String>().is_none());
    }

    #[test]
    fn only_unexpected_errors_force_restart() {
        assert!(ClientError::unexpected("socket closed").is_unexpected());
        assert!(!ClientError::rejected("blocked").is_unexpected());
        assert!(!ClientError::new(ClientErrorKind::Timeout, "slow").is_unexpected());
    }

    #[tokio::test]
    async fn dry_run_client_accepts_everything() {
        let client = DryRunClient;
        let session = client
            .login("c_user=1; xs=2", &LoginOptions::default())
            .await
            .expect("login");
        client
            .send(
                &session,
                MessageBody::Text("hi".to_owned()),
                Destination::Id("t1".to_owned()),
            )
            .await
            .expect("send");
        assert_eq!(client.identity(&session).await.unwrap(), "dry-run");
    }
}
