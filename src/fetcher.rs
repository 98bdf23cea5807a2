//! Message fetcher
//!
//! Retrieves one conversation's messages and unread counter, and derives the
//! most recent message.

use crate::{
    protocol,
    session::SessionContext,
    storage::{latest_message, Message},
    transport::Backend,
    ConversationId, Result,
};
use std::sync::Arc;

/// Unread counter and latest message of one conversation, fetched together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSnapshot {
    /// Conversation ID
    pub conversation_id: ConversationId,
    /// Backend unread counter for the current user
    pub unread: u64,
    /// Most recent message, if any
    pub last: Option<Message>,
}

/// Per-conversation message and unread fetches
pub struct MessageFetcher {
    backend: Arc<dyn Backend>,
    session: Arc<SessionContext>,
}

impl MessageFetcher {
    /// Create a fetcher
    pub fn new(backend: Arc<dyn Backend>, session: Arc<SessionContext>) -> Self {
        Self { backend, session }
    }

    /// All messages of a conversation, ascending by ID
    pub async fn messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>> {
        let payload = self
            .session
            .observe(self.backend.fetch_messages(conversation_id))
            .await?;
        Ok(protocol::normalize_messages(payload, conversation_id))
    }

    /// Most recent message of a conversation
    pub async fn latest_message(&self, conversation_id: ConversationId) -> Result<Option<Message>> {
        let messages = self.messages(conversation_id).await?;
        Ok(latest_message(&messages).cloned())
    }

    /// Unread counter of a conversation for the current user
    pub async fn unread_count(&self, conversation_id: ConversationId) -> Result<u64> {
        let payload = self
            .session
            .observe(self.backend.fetch_unread(conversation_id))
            .await?;
        Ok(protocol::parse_unread(&payload))
    }

    /// Fetch unread counter and latest message concurrently
    ///
    /// Fails as a whole if either fetch fails.
    pub async fn snapshot(&self, conversation_id: ConversationId) -> Result<ConversationSnapshot> {
        let (unread, last) = tokio::try_join!(
            self.unread_count(conversation_id),
            self.latest_message(conversation_id)
        )?;

        Ok(ConversationSnapshot {
            conversation_id,
            unread,
            last,
        })
    }
}
