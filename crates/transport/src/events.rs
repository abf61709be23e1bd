use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use roomservice_core::domain::tenant::{Credentials, Tenant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Direct,
    Group,
    Broadcast,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Transport-assigned identifier; redeliveries reuse it.
    pub message_id: String,
    pub sender: String,
    pub text: String,
    pub kind: ChatKind,
    pub from_self: bool,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn direct(
        message_id: impl Into<String>,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            sender: sender.into(),
            text: text.into(),
            kind: ChatKind::Direct,
            from_self: false,
            received_at: Utc::now(),
        }
    }
}

/// What the session manager does after the transport reports a closure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Reconnect with the stored credentials.
    Reconnect,
    /// Stored credentials are dead; clear them and pair again.
    Reauthenticate,
    /// Tear the handle down and surface the failure.
    Fatal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    ConnectionLost,
    ConnectionClosed,
    TimedOut,
    RestartRequired,
    ServiceUnavailable,
    LoggedOut,
    BadSession,
    ConnectionReplaced,
    Forbidden,
    Unknown(String),
}

impl CloseReason {
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .map(|ch| ch.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "connectionlost" => Self::ConnectionLost,
            "connectionclosed" => Self::ConnectionClosed,
            "timedout" | "timeout" => Self::TimedOut,
            "restartrequired" => Self::RestartRequired,
            "unavailableservice" | "serviceunavailable" => Self::ServiceUnavailable,
            "loggedout" => Self::LoggedOut,
            "badsession" | "sessionexpired" => Self::BadSession,
            "connectionreplaced" => Self::ConnectionReplaced,
            "forbidden" => Self::Forbidden,
            _ => Self::Unknown(raw.trim().to_owned()),
        }
    }

    pub fn disposition(&self) -> CloseDisposition {
        match self {
            Self::ConnectionLost
            | Self::ConnectionClosed
            | Self::TimedOut
            | Self::RestartRequired
            | Self::ServiceUnavailable => CloseDisposition::Reconnect,
            Self::LoggedOut | Self::BadSession => CloseDisposition::Reauthenticate,
            Self::ConnectionReplaced | Self::Forbidden | Self::Unknown(_) => {
                CloseDisposition::Fatal
            }
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ConnectionLost => "connectionLost",
            Self::ConnectionClosed => "connectionClosed",
            Self::TimedOut => "timedOut",
            Self::RestartRequired => "restartRequired",
            Self::ServiceUnavailable => "unavailableService",
            Self::LoggedOut => "loggedOut",
            Self::BadSession => "badSession",
            Self::ConnectionReplaced => "connectionReplaced",
            Self::Forbidden => "forbidden",
            Self::Unknown(raw) => raw.as_str(),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    PairingChallenge(String),
    CredentialsUpdated(Credentials),
    Ready,
    Closed(CloseReason),
    MessageReceived(InboundMessage),
}

impl TransportEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PairingChallenge(_) => "pairing_challenge",
            Self::CredentialsUpdated(_) => "credentials_updated",
            Self::Ready => "ready",
            Self::Closed(_) => "closed",
            Self::MessageReceived(_) => "message_received",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("handler rejected message: {0}")]
    Rejected(String),
    #[error("handler unavailable: {0}")]
    Unavailable(String),
}

/// Receives guest messages that reached a tenant's live session.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(
        &self,
        tenant: &Tenant,
        message: InboundMessage,
        context: &EventContext,
    ) -> Result<(), HandlerError>;
}

#[derive(Default)]
pub struct NoopInboundHandler;

#[async_trait]
impl InboundHandler for NoopInboundHandler {
    async fn handle(
        &self,
        _tenant: &Tenant,
        _message: InboundMessage,
        _context: &EventContext,
    ) -> Result<(), HandlerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CloseDisposition, CloseReason};

    #[test]
    fn transient_reasons_reconnect() {
        for raw in ["connectionLost", "timedOut", "restartRequired", "connection_closed"] {
            assert_eq!(
                CloseReason::parse(raw).disposition(),
                CloseDisposition::Reconnect,
                "{raw} should reconnect"
            );
        }
    }

    #[test]
    fn dead_sessions_require_reauthentication() {
        assert_eq!(CloseReason::parse("loggedOut"), CloseReason::LoggedOut);
        assert_eq!(CloseReason::parse("LOGGED_OUT").disposition(), CloseDisposition::Reauthenticate);
        assert_eq!(CloseReason::parse("badSession").disposition(), CloseDisposition::Reauthenticate);
    }

    #[test]
    fn unknown_reasons_are_fatal_and_keep_their_text() {
        let reason = CloseReason::parse(" somethingNew ");
        assert_eq!(reason, CloseReason::Unknown("somethingNew".to_owned()));
        assert_eq!(reason.disposition(), CloseDisposition::Fatal);
        assert_eq!(reason.to_string(), "somethingNew");
    }
}
