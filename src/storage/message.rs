//! Message structures and latest-message selection

use crate::{ConversationId, MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const IMAGE_PREVIEW: &str = "[image]";
const ATTACHMENT_PREVIEW: &str = "[attachment]";

/// A message fetched from the backend
///
/// Messages are append-only and never mutated once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID, monotonically increasing within its conversation
    pub id: MessageId,
    /// Conversation this message belongs to
    pub conversation_id: ConversationId,
    /// Sender user ID, when the backend reports one
    pub sender_id: Option<UserId>,
    /// Sender display name, when the backend reports one
    pub sender_name: Option<String>,
    /// Text body
    pub text: Option<String>,
    /// Attachment URL or path
    pub attachment: Option<String>,
    /// Creation time
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a text message
    pub fn new(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id: Some(sender_id),
            sender_name: Some(sender_name.into()),
            text: Some(text.into()),
            attachment: None,
            timestamp: None,
        }
    }

    /// Text preview truncated to `max_chars` characters
    ///
    /// A message with no text but an attachment previews as `[image]` or
    /// `[attachment]`.
    pub fn preview(&self, max_chars: usize) -> String {
        let text = self.text.as_deref().unwrap_or_default();
        let text = match (text.trim().is_empty(), &self.attachment) {
            (true, Some(_)) if self.has_image_attachment() => IMAGE_PREVIEW,
            (true, Some(_)) => ATTACHMENT_PREVIEW,
            _ => text,
        };
        text.chars().take(max_chars).collect()
    }

    /// Whether the attachment looks like an image
    pub fn has_image_attachment(&self) -> bool {
        const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

        self.attachment
            .as_deref()
            .and_then(|a| a.rsplit_once('.'))
            .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// Select the most recent message
///
/// The highest ID wins. Among messages sharing that ID, the later timestamp
/// wins; a missing timestamp sorts before any present one.
pub fn latest_message(messages: &[Message]) -> Option<&Message> {
    messages.iter().max_by(|a, b| {
        a.id.cmp(&b.id).then_with(|| a.timestamp.cmp(&b.timestamp))
    })
}
