//! Transport abstraction for the messaging session.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::pipeline::types::InboundMessage;

/// Notification emitted by the messaging session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The device must be linked; `code` is the pairing payload to show.
    Pairing {
        #[serde(default)]
        code: String,
    },
    Authenticated,
    AuthFailed {
        #[serde(default)]
        reason: String,
    },
    /// Session is ready; carries our own account identifier.
    Connected { own_id: String },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    MessageReceived(Box<InboundMessage>),
}

impl SessionEvent {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pairing { .. } => "pairing",
            Self::Authenticated => "authenticated",
            Self::AuthFailed { .. } => "auth_failed",
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::MessageReceived(_) => "message_received",
        }
    }
}

/// Stream of session notifications, in arrival order.
pub type EventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

/// A messaging-session transport: event source plus teardown sink.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &str;

    /// Start the session and return its notification stream.
    async fn start(&self) -> Result<EventStream, SessionError>;

    /// Tear the session down. Idempotent.
    async fn shutdown(&self) -> Result<(), SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lifecycle_events() {
        let pairing: SessionEvent =
            serde_json::from_str(r#"{"event": "pairing", "code": "2@abc"}"#).unwrap();
        assert!(matches!(pairing, SessionEvent::Pairing { ref code } if code == "2@abc"));

        let auth: SessionEvent = serde_json::from_str(r#"{"event": "authenticated"}"#).unwrap();
        assert_eq!(auth.label(), "authenticated");

        let connected: SessionEvent =
            serde_json::from_str(r#"{"event": "connected", "own_id": "1555@c.us"}"#).unwrap();
        assert!(matches!(connected, SessionEvent::Connected { ref own_id } if own_id == "1555@c.us"));

        let dropped: SessionEvent = serde_json::from_str(r#"{"event": "disconnected"}"#).unwrap();
        assert!(matches!(dropped, SessionEvent::Disconnected { ref reason } if reason.is_empty()));
    }

    #[test]
    fn parses_message_received() {
        let line = r#"{
            "event": "message_received",
            "message": {"body": "invoice due", "from": "1555@c.us", "timestamp": "2026-03-01T10:15:30Z"},
            "sender": {"number": "1555", "display_name": "Bob"},
            "conversation": {"kind": "direct"}
        }"#;
        let event: SessionEvent = serde_json::from_str(line).unwrap();
        match event {
            SessionEvent::MessageReceived(inbound) => {
                assert_eq!(inbound.message.body, "invoice due");
                assert_eq!(inbound.sender.label(), "Bob");
            }
            other => panic!("Expected MessageReceived, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_event() {
        assert!(serde_json::from_str::<SessionEvent>(r#"{"event": "typing"}"#).is_err());
    }
}
