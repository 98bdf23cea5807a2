//! Unread badge watcher
//!
//! The conversation-list tick: a slower poll that only needs unread counters,
//! for badges and the "any unread" indicator.

use crate::{
    directory::ConversationDirectory,
    fetcher::MessageFetcher,
    session::SessionContext,
    signals::SeenAdvanced,
    sync::scheduler::PeriodicJob,
    ConversationId, Result, UserId,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Unread counters of the current user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadSummary {
    /// Unread count per conversation
    pub per_conversation: HashMap<ConversationId, u64>,
    /// Other participant of each direct conversation
    pub counterparts: HashMap<ConversationId, UserId>,
}

impl UnreadSummary {
    /// Whether any conversation has unread messages
    pub fn any_unread(&self) -> bool {
        self.per_conversation.values().any(|count| *count > 0)
    }

    /// Sum of all unread counts
    pub fn total(&self) -> u64 {
        self.per_conversation.values().sum()
    }

    /// Unread count of a conversation
    pub fn for_conversation(&self, conversation_id: ConversationId) -> u64 {
        self.per_conversation
            .get(&conversation_id)
            .copied()
            .unwrap_or(0)
    }

    /// Unread count of the direct conversation with `user`
    pub fn for_user(&self, user: UserId) -> u64 {
        self.counterparts
            .iter()
            .filter(|(_, other)| **other == user)
            .map(|(conversation_id, _)| self.for_conversation(*conversation_id))
            .sum()
    }
}

/// Polls unread counters and publishes an [`UnreadSummary`]
pub struct UnreadWatcher {
    session: Arc<SessionContext>,
    directory: Arc<ConversationDirectory>,
    fetcher: Arc<MessageFetcher>,
    tx: watch::Sender<UnreadSummary>,
}

impl UnreadWatcher {
    /// Create a watcher with an empty summary
    pub fn new(
        session: Arc<SessionContext>,
        directory: Arc<ConversationDirectory>,
        fetcher: Arc<MessageFetcher>,
    ) -> Self {
        let (tx, _rx) = watch::channel(UnreadSummary::default());
        Self {
            session,
            directory,
            fetcher,
            tx,
        }
    }

    /// Latest published summary
    pub fn summary(&self) -> UnreadSummary {
        self.tx.borrow().clone()
    }

    /// Subscribe to summary updates
    pub fn subscribe(&self) -> watch::Receiver<UnreadSummary> {
        self.tx.subscribe()
    }

    /// Poll now, outside the timer
    ///
    /// A conversation whose counter fails to load keeps its previous count.
    pub async fn refresh(&self) -> Result<UnreadSummary> {
        let Some(me) = self.session.current_identity().await? else {
            return Ok(self.summary());
        };

        let conversations = self.directory.list_conversations().await?;
        let previous = self.summary();

        let counts = join_all(conversations.iter().map(|c| async move {
            (c.id, self.fetcher.unread_count(c.id).await)
        }))
        .await;

        let mut summary = UnreadSummary::default();
        for conversation in &conversations {
            if let Some(other) = conversation.counterpart(&me) {
                summary.counterparts.insert(conversation.id, other.id);
            }
        }
        for (conversation_id, count) in counts {
            match count {
                Ok(count) => {
                    summary.per_conversation.insert(conversation_id, count);
                }
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    debug!("Unread count for {} unavailable: {}", conversation_id, e);
                    if let Some(previous) = previous.per_conversation.get(&conversation_id) {
                        summary.per_conversation.insert(conversation_id, *previous);
                    }
                }
            }
        }

        self.tx.send_replace(summary.clone());
        Ok(summary)
    }

    /// Zero the badge of a conversation the user has just read
    pub fn apply_seen(&self, event: SeenAdvanced) {
        self.tx.send_if_modified(|summary| {
            match summary.per_conversation.get_mut(&event.conversation_id) {
                Some(count) if *count > 0 => {
                    *count = 0;
                    true
                }
                _ => false,
            }
        });
    }

    /// Clear all counters
    pub fn reset(&self) {
        self.tx.send_replace(UnreadSummary::default());
    }
}

#[async_trait]
impl PeriodicJob for UnreadWatcher {
    fn name(&self) -> &'static str {
        "unread-watcher"
    }

    async fn run(&self) {
        match self.refresh().await {
            Ok(summary) => debug!("Unread total: {}", summary.total()),
            Err(e) if e.is_auth() => warn!("Unread watcher halted: {}", e),
            Err(e) => debug!("Unread tick skipped: {}", e),
        }
    }
}
