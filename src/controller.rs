//! Chat session controller
//!
//! The interactive side of the engine. It opens and creates conversations,
//! loads and sends messages, and keeps the shared state of the sync loop
//! current:
//! - the active conversation marker follows whatever conversation is open
//! - opening a conversation publishes a seen event for its newest message
//! - a successful send refreshes unread badges without waiting for the timer

use crate::{
    active::ActiveConversationTracker,
    directory::ConversationDirectory,
    fetcher::MessageFetcher,
    protocol::{self, Attachment, GetOrCreateRequest, OutgoingMessage},
    session::SessionContext,
    signals::{SeenAdvanced, SeenBus},
    storage::{
        latest_message, Conversation, ConversationKey, Identity, IntentStore, Message, OpenIntent,
    },
    sync::UnreadWatcher,
    transport::Backend,
    ConversationId, Error, Result, UserId,
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, info, warn};

/// Text and attachment being composed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeState {
    /// Typed text
    pub text: String,
    /// Selected (or pasted) attachment
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Default)]
struct ChatState {
    current: Option<Conversation>,
    messages: Vec<Message>,
    compose: ComposeState,
    sending: bool,
}

/// Drives the chat view
pub struct ChatSessionController {
    backend: Arc<dyn Backend>,
    session: Arc<SessionContext>,
    directory: Arc<ConversationDirectory>,
    fetcher: Arc<MessageFetcher>,
    active: ActiveConversationTracker,
    seen: SeenBus,
    unread: Arc<UnreadWatcher>,
    intents: Arc<IntentStore>,
    /// Conversations resolved through get-or-create this session
    known: Mutex<HashMap<ConversationKey, Conversation>>,
    /// Serializes get-or-create so concurrent opens issue one request
    opening: tokio::sync::Mutex<()>,
    state: Mutex<ChatState>,
    /// Bumped by [`Self::reset`]; requests started earlier do not touch the view
    epoch: AtomicU64,
    deep_link_attempts: u32,
    deep_link_delay: Duration,
}

impl ChatSessionController {
    /// Create a controller
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn Backend>,
        session: Arc<SessionContext>,
        directory: Arc<ConversationDirectory>,
        fetcher: Arc<MessageFetcher>,
        active: ActiveConversationTracker,
        seen: SeenBus,
        unread: Arc<UnreadWatcher>,
        intents: Arc<IntentStore>,
    ) -> Self {
        Self {
            backend,
            session,
            directory,
            fetcher,
            active,
            seen,
            unread,
            intents,
            known: Mutex::new(HashMap::new()),
            opening: tokio::sync::Mutex::new(()),
            state: Mutex::new(ChatState::default()),
            epoch: AtomicU64::new(0),
            deep_link_attempts: 5,
            deep_link_delay: Duration::from_millis(500),
        }
    }

    /// Configure how long a deep link waits for its conversation to appear
    pub fn with_deep_link_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.deep_link_attempts = attempts.max(1);
        self.deep_link_delay = delay;
        self
    }

    /// Forget the open conversation, the draft and the resolved keys
    ///
    /// Runs on every credential change, so nothing of one session leaks into
    /// the next.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.known.lock().clear();
        *self.state.lock() = ChatState::default();
        debug!("Chat session state cleared");
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    async fn me(&self) -> Result<Identity> {
        self.session
            .current_identity()
            .await?
            .ok_or_else(|| Error::Auth("Not logged in".to_string()))
    }

    // ========== Conversations ==========

    /// Resolve a conversation through the backend's get-or-create
    ///
    /// Keys resolved once this session are answered from memory.
    pub async fn get_or_create(&self, key: &ConversationKey) -> Result<Conversation> {
        if let Some(known) = self.known.lock().get(key) {
            return Ok(known.clone());
        }

        let _guard = self.opening.lock().await;
        if let Some(known) = self.known.lock().get(key) {
            return Ok(known.clone());
        }

        let epoch = self.epoch();
        let request = GetOrCreateRequest::from(key);
        let payload = self
            .session
            .observe(self.backend.get_or_create_conversation(&request))
            .await?;
        let mut conversation = protocol::normalize_conversation(&payload).ok_or_else(|| {
            Error::Transient("get_or_create returned a conversation without id".to_string())
        })?;

        if key.is_group {
            conversation.is_group = true;
            if conversation.group_name.is_none() {
                conversation.group_name = key.group_name.clone();
            }
        }

        debug!("Resolved conversation {} for {:?}", conversation.id, key);
        if self.epoch() == epoch {
            self.known.lock().insert(key.clone(), conversation.clone());
            self.directory.upsert(conversation.clone());
        }
        Ok(conversation)
    }

    /// Open (creating if needed) the direct conversation with `user_id`
    pub async fn open_direct(&self, user_id: UserId) -> Result<Conversation> {
        let me = self.me().await?;
        if user_id == me.id {
            return Err(Error::Validation(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }

        let conversation = self
            .get_or_create(&ConversationKey::direct(me.id, user_id))
            .await?;
        self.activate(conversation).await
    }

    /// Open a group conversation known to the directory
    pub async fn open_group(&self, conversation_id: ConversationId) -> Result<Conversation> {
        let conversation = self
            .directory
            .find(conversation_id)
            .ok_or_else(|| Error::UnknownConversation(format!("group {}", conversation_id)))?;
        self.activate(conversation).await
    }

    /// Open whatever `intent` points at
    pub async fn open(&self, intent: OpenIntent) -> Result<Conversation> {
        match intent {
            OpenIntent::Direct { user_id } => self.open_direct(user_id).await,
            OpenIntent::Group { conversation_id } => self.open_group(conversation_id).await,
        }
    }

    /// Make `conversation` the open one
    ///
    /// Sets the active marker, marks the conversation seen on the backend, loads
    /// its messages and publishes a seen event for the newest one.
    pub async fn activate(&self, conversation: Conversation) -> Result<Conversation> {
        let conversation_id = conversation.id;
        let epoch = self.epoch();
        self.active.set_active(conversation_id);
        {
            let mut state = self.state.lock();
            state.current = Some(conversation.clone());
            state.messages.clear();
        }
        info!("Opened conversation {}", conversation_id);

        match self
            .session
            .observe(self.backend.mark_seen(conversation_id))
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => warn!("Failed to mark conversation {} seen: {}", conversation_id, e),
        }

        let messages = self.fetcher.messages(conversation_id).await?;
        let newest = latest_message(&messages).map(|m| m.id);
        self.store_messages(conversation_id, messages);

        if let Some(up_to) = newest.filter(|_| self.epoch() == epoch) {
            self.seen.publish(SeenAdvanced {
                conversation_id,
                up_to,
            });
        }
        Ok(conversation)
    }

    /// Navigate away from the open conversation
    pub fn close(&self) {
        let mut state = self.state.lock();
        if let Some(current) = state.current.take() {
            self.active.clear_if(current.id);
            debug!("Closed conversation {}", current.id);
        }
        state.messages.clear();
    }

    /// The open conversation
    pub fn current(&self) -> Option<Conversation> {
        self.state.lock().current.clone()
    }

    /// Messages of the open conversation, ascending by ID
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    /// Reload the open conversation's messages
    ///
    /// This does not advance seen state; messages arriving while the view is
    /// open are acknowledged the next time the conversation is opened.
    pub async fn poll_active(&self) -> Result<Vec<Message>> {
        let Some(conversation_id) = self.current().map(|c| c.id) else {
            return Ok(Vec::new());
        };
        let messages = self.fetcher.messages(conversation_id).await?;
        self.store_messages(conversation_id, messages.clone());
        Ok(messages)
    }

    fn store_messages(&self, conversation_id: ConversationId, messages: Vec<Message>) {
        let mut state = self.state.lock();
        // Another conversation may have been opened meanwhile.
        if state.current.as_ref().map(|c| c.id) == Some(conversation_id) {
            state.messages = messages;
        }
    }

    // ========== Composing ==========

    /// Current compose state
    pub fn compose(&self) -> ComposeState {
        self.state.lock().compose.clone()
    }

    /// Replace the typed text
    pub fn set_text(&self, text: impl Into<String>) {
        self.state.lock().compose.text = text.into();
    }

    /// Select an attachment (replacing any previous one)
    pub fn set_attachment(&self, attachment: Attachment) {
        self.state.lock().compose.attachment = Some(attachment);
    }

    /// Drop the selected attachment
    pub fn clear_attachment(&self) {
        self.state.lock().compose.attachment = None;
    }

    /// Whether a send is in flight
    pub fn is_sending(&self) -> bool {
        self.state.lock().sending
    }

    /// Send the composed message to the open conversation
    ///
    /// The compose state is cleared before the request goes out. On failure the
    /// typed text is restored (unless the user already typed something new);
    /// the attachment is not.
    pub async fn send_message(&self) -> Result<Option<Message>> {
        let epoch = self.epoch();
        let (conversation_id, outgoing) = {
            let mut state = self.state.lock();
            let conversation_id = state
                .current
                .as_ref()
                .map(|c| c.id)
                .ok_or_else(|| Error::Validation("No conversation is open".to_string()))?;
            if state.compose.text.trim().is_empty() && state.compose.attachment.is_none() {
                return Err(Error::Validation("Nothing to send".to_string()));
            }

            let compose = std::mem::take(&mut state.compose);
            state.sending = true;
            (
                conversation_id,
                OutgoingMessage {
                    text: compose.text,
                    attachment: compose.attachment,
                },
            )
        };

        let result = self
            .session
            .observe(self.backend.send_message(conversation_id, &outgoing))
            .await;

        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                let mut state = self.state.lock();
                state.sending = false;
                if state.compose.text.is_empty() && self.epoch() == epoch {
                    state.compose.text = outgoing.text;
                }
                warn!("Failed to send message to {}: {}", conversation_id, e);
                return Err(e);
            }
        };
        self.state.lock().sending = false;

        let sent = protocol::normalize_message(&payload, conversation_id);
        info!("Message sent to conversation {}", conversation_id);

        if let Err(e) = self.poll_active().await {
            debug!("Reload after send failed: {}", e);
        }
        if let Err(e) = self.unread.refresh().await {
            debug!("Unread refresh after send failed: {}", e);
        }
        Ok(sent)
    }

    // ========== Groups and users ==========

    /// Create a group (or return the existing one with the same members and name)
    pub async fn create_group(&self, name: &str, members: &[UserId]) -> Result<Conversation> {
        let mut problems = Vec::new();
        if name.trim().is_empty() {
            problems.push("Group name is required");
        }
        if members.iter().all(|id| *id == 0) {
            problems.push("Select at least one participant");
        }
        if !problems.is_empty() {
            return Err(Error::Validation(problems.join("; ")));
        }

        let me = self.me().await?;
        let key = ConversationKey::group(
            std::iter::once(me.id).chain(members.iter().copied()),
            name,
        );
        let group = self.get_or_create(&key).await?;

        if let Err(e) = self.directory.list_groups().await {
            if e.is_auth() {
                return Err(e);
            }
            debug!("Group list refresh failed: {}", e);
        }
        info!("Group {} ready with {} participant(s)", group.id, key.participants.len());
        Ok(group)
    }

    /// Delete a group; only its creator or staff may do so
    pub async fn delete_group(&self, conversation_id: ConversationId) -> Result<()> {
        let me = self.me().await?;
        let group = self
            .directory
            .find_group(conversation_id)
            .ok_or_else(|| Error::UnknownConversation(format!("group {}", conversation_id)))?;
        if !group.can_delete(&me) {
            return Err(Error::Validation(
                "Only the group creator can delete this group".to_string(),
            ));
        }

        self.session
            .observe(self.backend.delete_group(conversation_id))
            .await?;

        self.directory.remove(conversation_id);
        self.known.lock().retain(|_, c| c.id != conversation_id);
        if self.current().is_some_and(|c| c.id == conversation_id) {
            self.close();
        }
        info!("Deleted group {}", conversation_id);

        if let Err(e) = self.directory.list_groups().await {
            debug!("Group list refresh failed: {}", e);
        }
        Ok(())
    }

    /// Other users, optionally filtered by a case-insensitive name fragment
    pub async fn list_users(&self, filter: Option<&str>) -> Result<Vec<Identity>> {
        let me = self.me().await?;
        let payload = self.session.observe(self.backend.fetch_users()).await?;
        let needle = filter.map(|f| f.trim().to_lowercase()).unwrap_or_default();

        Ok(protocol::list_items(payload)
            .iter()
            .filter_map(protocol::normalize_user)
            .filter(|u| u.id != me.id)
            .filter(|u| needle.is_empty() || u.display_name.to_lowercase().contains(&needle))
            .collect())
    }

    // ========== Deep links ==========

    /// Store an open request for later (e.g. from a notification click)
    pub fn request_open(&self, intent: OpenIntent) -> Result<()> {
        self.intents.request(intent)
    }

    /// Consume and resolve the pending deep-link intent, if any
    ///
    /// Group targets wait for the directory, refreshing it between attempts.
    /// If the target cannot be resolved the intent is put back and the error
    /// returned.
    pub async fn process_pending_intent(&self) -> Result<Option<Conversation>> {
        let Some(intent) = self.intents.take()? else {
            return Ok(None);
        };

        match self.resolve_intent(intent).await {
            Ok(conversation) => Ok(Some(conversation)),
            Err(e) => {
                warn!("Deep link {:?} not resolved: {}", intent, e);
                self.intents.restore(intent)?;
                Err(e)
            }
        }
    }

    async fn resolve_intent(&self, intent: OpenIntent) -> Result<Conversation> {
        let conversation_id = match intent {
            OpenIntent::Direct { user_id } => return self.open_direct(user_id).await,
            OpenIntent::Group { conversation_id } => conversation_id,
        };

        for attempt in 1..=self.deep_link_attempts {
            if let Some(conversation) = self.directory.find(conversation_id) {
                return self.activate(conversation).await;
            }

            debug!(
                "Deep link target {} not loaded yet (attempt {}/{})",
                conversation_id, attempt, self.deep_link_attempts
            );
            match self.directory.list_conversations().await {
                Ok(_) => {
                    if let Some(conversation) = self.directory.find(conversation_id) {
                        return self.activate(conversation).await;
                    }
                }
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => debug!("Directory refresh failed: {}", e),
            }

            if attempt < self.deep_link_attempts {
                tokio::time::sleep(self.deep_link_delay).await;
            }
        }

        Err(Error::UnknownConversation(format!(
            "conversation {}",
            conversation_id
        )))
    }
}
