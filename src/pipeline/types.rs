//! Shared types for the message processing pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Session context ─────────────────────────────────────────────────

/// Per-session state the pipeline needs, passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// The linked account's own identifier, used for mention checks.
    pub own_id: String,
}

impl SessionContext {
    pub fn new(own_id: impl Into<String>) -> Self {
        Self {
            own_id: own_id.into(),
        }
    }

    /// Whether our own account appears in a mention list.
    pub fn is_mentioned(&self, mentioned_ids: &[String]) -> bool {
        mentioned_ids.iter().any(|id| *id == self.own_id)
    }
}

// ── Inbound message ─────────────────────────────────────────────────

/// Snapshot of one inbound message as delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Message body text (may be empty for media-only messages).
    #[serde(default)]
    pub body: String,
    /// Sender identifier as reported by the transport.
    pub from: String,
    /// When the message was sent.
    pub timestamp: DateTime<Utc>,
    /// Whether the transport flagged an attachment.
    #[serde(default)]
    pub has_media: bool,
    /// Where to obtain the attachment bytes, if any.
    #[serde(default)]
    pub media: Option<MediaSource>,
    /// Participants mentioned in this message (group chats).
    #[serde(default)]
    pub mentioned_ids: Vec<String>,
}

/// Attachment source handed over by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum MediaSource {
    /// Base64 payload carried inline in the notification.
    Inline {
        mimetype: String,
        #[serde(default)]
        filename: Option<String>,
        data: String,
    },
    /// Attachment fetched over HTTP.
    Url {
        url: String,
        #[serde(default)]
        mimetype: Option<String>,
        #[serde(default)]
        filename: Option<String>,
    },
}

/// The originating participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Stable phone number / identifier.
    pub number: String,
    /// Push name, if the contact has one.
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Sender {
    /// Display name, falling back to the number.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.number)
    }
}

/// The thread a message arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conversation {
    Direct,
    Group {
        name: String,
        #[serde(default)]
        participants: Vec<String>,
    },
}

impl Conversation {
    pub fn chat_type(&self) -> ChatType {
        match self {
            Self::Direct => ChatType::Direct,
            Self::Group { .. } => ChatType::Group,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group { .. })
    }
}

/// One `message_received` notification: message plus its context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message: RawMessage,
    pub sender: Sender,
    /// Absent when the transport could not resolve the chat.
    #[serde(default)]
    pub conversation: Option<Conversation>,
}

// ── Extraction result ───────────────────────────────────────────────

/// An attachment persisted to the inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaArtifact {
    pub mime_type: String,
    pub filename: String,
    pub path: PathBuf,
}

// ── Canonical event ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Direct,
    Group,
}

impl ChatType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

/// Processor-ready record for an accepted message.
///
/// Field order is the wire order of the request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub from: String,
    pub name: String,
    pub body: String,
    pub timestamp: String,
    pub chat_type: ChatType,
    pub has_media: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentioned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_filename: Option<String>,
    #[serde(default)]
    pub media_files: Vec<String>,
}

// ── Handoff result ──────────────────────────────────────────────────

/// Structured output of the external processor. Shape is processor-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandoffResult(pub serde_json::Value);

impl HandoffResult {
    /// The conventional `success` flag, if the processor reported one.
    pub fn success(&self) -> Option<bool> {
        self.0.get("success").and_then(serde_json::Value::as_bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_context_mention_check() {
        let session = SessionContext::new("15550001111@c.us");
        assert!(session.is_mentioned(&["15550001111@c.us".to_string()]));
        assert!(!session.is_mentioned(&["15559999999@c.us".to_string()]));
        assert!(!session.is_mentioned(&[]));
    }

    #[test]
    fn sender_label_falls_back_to_number() {
        let named = Sender {
            number: "15551234567".into(),
            display_name: Some("Alice".into()),
        };
        assert_eq!(named.label(), "Alice");

        let blank = Sender {
            number: "15551234567".into(),
            display_name: Some("  ".into()),
        };
        assert_eq!(blank.label(), "15551234567");
    }

    #[test]
    fn inbound_message_deserializes_from_feed_json() {
        let json = serde_json::json!({
            "message": {
                "body": "see attached",
                "from": "15551234567@c.us",
                "timestamp": "2026-03-01T10:15:30Z",
                "has_media": true,
                "media": {
                    "source": "inline",
                    "mimetype": "application/pdf",
                    "filename": "invoice.pdf",
                    "data": "aGVsbG8="
                },
                "mentioned_ids": ["15550001111@c.us"]
            },
            "sender": {"number": "15551234567", "display_name": "Alice"},
            "conversation": {"kind": "group", "name": "Suppliers", "participants": ["a", "b"]}
        });

        let inbound: InboundMessage = serde_json::from_value(json).unwrap();
        assert!(inbound.message.has_media);
        assert!(matches!(
            inbound.message.media,
            Some(MediaSource::Inline { ref filename, .. }) if filename.as_deref() == Some("invoice.pdf")
        ));
        assert_eq!(inbound.sender.label(), "Alice");
        assert_eq!(
            inbound.conversation.as_ref().map(Conversation::chat_type),
            Some(ChatType::Group)
        );
    }

    #[test]
    fn inbound_message_minimal_fields() {
        let json = serde_json::json!({
            "message": {"from": "x", "timestamp": "2026-03-01T10:15:30Z"},
            "sender": {"number": "x"}
        });
        let inbound: InboundMessage = serde_json::from_value(json).unwrap();
        assert!(inbound.message.body.is_empty());
        assert!(!inbound.message.has_media);
        assert!(inbound.conversation.is_none());
    }

    #[test]
    fn canonical_event_omits_absent_optionals() {
        let event = CanonicalEvent {
            from: "15551234567".into(),
            name: "Alice".into(),
            body: "hello".into(),
            timestamp: "2026-03-01T10:15:30.000Z".into(),
            chat_type: ChatType::Direct,
            has_media: false,
            group_name: None,
            mentioned: None,
            media_type: None,
            media_filename: None,
            media_files: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys.len(),
            7,
            "expected only the unconditional keys, got {keys:?}"
        );
        assert_eq!(json["chat_type"], "direct");
        assert_eq!(json["media_files"], serde_json::json!([]));
    }

    #[test]
    fn handoff_result_success_flag() {
        let ok = HandoffResult(serde_json::json!({"success": true, "filepath": "x.md"}));
        assert_eq!(ok.success(), Some(true));
        let opaque = HandoffResult(serde_json::json!([1, 2, 3]));
        assert_eq!(opaque.success(), None);
    }
}
