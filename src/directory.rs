//! Conversation directory
//!
//! Owns the authoritative list of conversations visible to the current user.
//! Other components receive cloned snapshots refreshed on every poll.

use crate::{
    protocol,
    session::SessionContext,
    storage::{Conversation, Identity},
    transport::Backend,
    ConversationId, Result, UserId,
};
use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::debug;

/// Fetches, normalizes and caches conversations
pub struct ConversationDirectory {
    backend: Arc<dyn Backend>,
    session: Arc<SessionContext>,
    conversations: RwLock<Vec<Conversation>>,
    loaded: AtomicBool,
}

impl ConversationDirectory {
    /// Create an empty directory
    pub fn new(backend: Arc<dyn Backend>, session: Arc<SessionContext>) -> Self {
        Self {
            backend,
            session,
            conversations: RwLock::new(Vec::new()),
            loaded: AtomicBool::new(false),
        }
    }

    /// Fetch all conversations, refreshing the cache
    ///
    /// On failure the cache keeps its previous contents.
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let payload = self
            .session
            .observe(self.backend.fetch_conversations())
            .await?;
        let conversations = protocol::normalize_conversations(payload);

        debug!("Directory refreshed: {} conversation(s)", conversations.len());
        *self.conversations.write() = conversations.clone();
        self.loaded.store(true, Ordering::Release);
        Ok(conversations)
    }

    /// Fetch group conversations and merge them into the cache
    pub async fn list_groups(&self) -> Result<Vec<Conversation>> {
        let payload = self
            .session
            .observe(self.backend.fetch_group_conversations())
            .await?;
        let groups: Vec<Conversation> = protocol::normalize_conversations(payload)
            .into_iter()
            .map(|mut c| {
                c.is_group = true;
                c
            })
            .collect();

        for group in &groups {
            self.upsert(group.clone());
        }
        Ok(groups)
    }

    /// Whether at least one listing succeeded since the last reset
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Cached conversations
    pub fn snapshot(&self) -> Vec<Conversation> {
        self.conversations.read().clone()
    }

    /// Cached conversation by ID
    pub fn find(&self, id: ConversationId) -> Option<Conversation> {
        self.conversations.read().iter().find(|c| c.id == id).cloned()
    }

    /// Cached group conversation by ID
    pub fn find_group(&self, id: ConversationId) -> Option<Conversation> {
        self.find(id).filter(|c| c.is_group)
    }

    /// Cached direct conversation between `me` and `user`
    pub fn find_direct_with(&self, me: &Identity, user: UserId) -> Option<Conversation> {
        self.conversations
            .read()
            .iter()
            .find(|c| c.counterpart(me).is_some_and(|other| other.id == user))
            .cloned()
    }

    /// Insert or replace a conversation in the cache
    pub fn upsert(&self, conversation: Conversation) {
        let mut conversations = self.conversations.write();
        match conversations.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => *existing = conversation,
            None => conversations.push(conversation),
        }
    }

    /// Remove a conversation from the cache
    pub fn remove(&self, id: ConversationId) -> bool {
        let mut conversations = self.conversations.write();
        let before = conversations.len();
        conversations.retain(|c| c.id != id);
        conversations.len() < before
    }

    /// Drop all cached conversations
    pub fn reset(&self) {
        self.conversations.write().clear();
        self.loaded.store(false, Ordering::Release);
    }
}
