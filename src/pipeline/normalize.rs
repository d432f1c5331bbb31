//! Assembly of the canonical event handed to the processor.

use chrono::SecondsFormat;

use crate::pipeline::types::{
    CanonicalEvent, Conversation, MediaArtifact, RawMessage, Sender, SessionContext,
};

/// Build the canonical event for an accepted message.
///
/// Pure: the same inputs always produce the same event. Group fields are set
/// only for group chats. `has_media` mirrors the message's own flag, while
/// the media type, filename and file list are set only when an artifact was
/// persisted.
pub fn normalize(
    message: &RawMessage,
    sender: &Sender,
    conversation: &Conversation,
    artifact: Option<&MediaArtifact>,
    session: &SessionContext,
) -> CanonicalEvent {
    let (group_name, mentioned) = match conversation {
        Conversation::Group { name, .. } => (
            Some(name.clone()),
            Some(session.is_mentioned(&message.mentioned_ids)),
        ),
        Conversation::Direct => (None, None),
    };

    CanonicalEvent {
        from: sender.number.clone(),
        name: sender.label().to_string(),
        body: message.body.clone(),
        timestamp: message
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        chat_type: conversation.chat_type(),
        has_media: message.has_media,
        group_name,
        mentioned,
        media_type: artifact.map(|a| a.mime_type.clone()),
        media_filename: artifact.map(|a| a.filename.clone()),
        media_files: artifact.map(|a| a.filename.clone()).into_iter().collect(),
    }
}
