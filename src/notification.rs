//! New-message notifications and the sinks that render them

use crate::{
    storage::{Conversation, Identity, Message, OpenIntent},
    ConversationId, MessageId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::info;

/// A "new message" notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Deterministic ID derived from conversation and message
    pub id: String,
    /// Conversation the message arrived in
    pub conversation_id: ConversationId,
    /// The message that triggered the notification
    pub message_id: MessageId,
    /// Conversation title (group name or sender)
    pub title: String,
    /// Truncated message text, possibly empty
    pub preview: String,
    /// What clicking the notification should open
    pub intent: OpenIntent,
}

impl Notification {
    /// Build the notification for `message` in `conversation`
    pub fn for_message(
        conversation: &Conversation,
        message: &Message,
        me: &Identity,
        preview_max_chars: usize,
    ) -> Self {
        Self {
            id: notification_id(conversation.id, message.id),
            conversation_id: conversation.id,
            message_id: message.id,
            title: conversation.title(me, Some(message)),
            preview: message.preview(preview_max_chars),
            intent: conversation.open_intent(me),
        }
    }

    /// Text shown to the user
    pub fn body(&self) -> String {
        if self.preview.is_empty() {
            format!("{}: New message", self.title)
        } else {
            format!("{}: New message\n{}", self.title, self.preview)
        }
    }
}

/// Deterministic notification ID for `(conversation, message)`
pub fn notification_id(conversation_id: ConversationId, message_id: MessageId) -> String {
    format!("newmsg-{}-{}", conversation_id, message_id)
}

/// Rendering layer for notifications
pub trait NotificationSink: Send + Sync {
    /// Show a notification
    fn notify(&self, notification: &Notification);

    /// Dismiss outstanding notifications
    fn dismiss_all(&self) {}
}

/// Sink that writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, notification: &Notification) {
        info!(
            id = %notification.id,
            conversation = notification.conversation_id,
            "{}",
            notification.body()
        );
    }
}

/// Sink that forwards notifications over a channel
///
/// Drops a notification for a message at or below the newest one already
/// delivered for its conversation, so memory stays bounded by the number of
/// conversations. Dismissal forgets everything.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
    delivered: Mutex<HashMap<ConversationId, MessageId>>,
}

impl ChannelSink {
    /// Create a sink and the receiving end
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                delivered: Mutex::new(HashMap::new()),
            },
            rx,
        )
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: &Notification) {
        {
            let mut delivered = self.delivered.lock();
            let newest = delivered.entry(notification.conversation_id).or_default();
            if notification.message_id <= *newest {
                return;
            }
            *newest = notification.message_id;
        }
        let _ = self.tx.send(notification.clone());
    }

    fn dismiss_all(&self) {
        self.delivered.lock().clear();
    }
}
