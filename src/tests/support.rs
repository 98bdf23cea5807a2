// Shared test doubles: an in-memory backend and a recording notification sink

use crate::{
    engine::ChatEngine,
    notification::{Notification, NotificationSink},
    protocol::{GetOrCreateRequest, OutgoingMessage},
    session::Credentials,
    storage::{IntentStore, Settings},
    transport::Backend,
    ConversationId, Error, MessageId, Result, UserId,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::oneshot;

pub const ME: UserId = 1;
pub const ALICE: UserId = 2;
pub const BOB: UserId = 3;

#[derive(Debug, Clone)]
struct FakeUser {
    id: UserId,
    name: String,
    is_staff: bool,
}

#[derive(Debug, Clone)]
struct FakeConversation {
    id: ConversationId,
    participants: Vec<UserId>,
    is_group: bool,
    group_name: Option<String>,
    created_by: Option<UserId>,
}

#[derive(Debug, Clone)]
struct FakeMessage {
    id: MessageId,
    sender: UserId,
    text: String,
}

#[derive(Debug, Default)]
struct FakeState {
    me: UserId,
    users: Vec<FakeUser>,
    conversations: Vec<FakeConversation>,
    messages: HashMap<ConversationId, Vec<FakeMessage>>,
    unread: HashMap<ConversationId, u64>,
    next_message_id: MessageId,
    next_conversation_id: ConversationId,

    reject_token: bool,
    fail_conversations: bool,
    fail_messages: HashSet<ConversationId>,
    fail_unread: HashSet<ConversationId>,
    fail_send: bool,
    paginate: bool,

    seen: Vec<ConversationId>,
    sent: Vec<(ConversationId, OutgoingMessage)>,
    created: Vec<GetOrCreateRequest>,
    deleted: Vec<ConversationId>,
}

/// In-memory backend modelling the REST API for a single logged-in user
pub struct FakeBackend {
    state: Mutex<FakeState>,
    me_calls: AtomicUsize,
    get_or_create_calls: AtomicUsize,
    conversation_gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
}

/// Handles to a conversation-list call parked by [`FakeBackend::hold_conversations`]
pub struct HeldCall {
    pub parked: oneshot::Receiver<()>,
    pub release: oneshot::Sender<()>,
}

impl FakeBackend {
    pub fn new() -> Self {
        let state = FakeState {
            me: ME,
            users: vec![
                FakeUser {
                    id: ME,
                    name: "me".to_string(),
                    is_staff: false,
                },
                FakeUser {
                    id: ALICE,
                    name: "alice".to_string(),
                    is_staff: false,
                },
                FakeUser {
                    id: BOB,
                    name: "bob".to_string(),
                    is_staff: false,
                },
            ],
            next_message_id: 1,
            next_conversation_id: 100,
            ..FakeState::default()
        };

        Self {
            state: Mutex::new(state),
            me_calls: AtomicUsize::new(0),
            get_or_create_calls: AtomicUsize::new(0),
            conversation_gate: Mutex::new(None),
        }
    }

    /// Park the next conversation-list call until released
    ///
    /// The token check runs after release, so the outcome reflects the
    /// backend state at that point.
    pub fn hold_conversations(&self) -> HeldCall {
        let (parked_tx, parked) = oneshot::channel();
        let (release, release_rx) = oneshot::channel();
        *self.conversation_gate.lock() = Some((parked_tx, release_rx));
        HeldCall { parked, release }
    }

    /// Switch the logged-in user (as a different token would)
    pub fn set_me(&self, id: UserId) {
        self.state.lock().me = id;
    }

    pub fn add_user(&self, id: UserId, name: &str, is_staff: bool) {
        self.state.lock().users.push(FakeUser {
            id,
            name: name.to_string(),
            is_staff,
        });
    }

    pub fn add_direct(&self, id: ConversationId, a: UserId, b: UserId) {
        self.state.lock().conversations.push(FakeConversation {
            id,
            participants: vec![a, b],
            is_group: false,
            group_name: None,
            created_by: Some(a),
        });
    }

    pub fn add_group(&self, id: ConversationId, name: &str, members: &[UserId], creator: UserId) {
        self.state.lock().conversations.push(FakeConversation {
            id,
            participants: members.to_vec(),
            is_group: true,
            group_name: Some(name.to_string()),
            created_by: Some(creator),
        });
    }

    /// Append a message; every participant but the sender gets an unread
    ///
    /// Unread counters are tracked for the current user only.
    pub fn push_message(&self, conversation_id: ConversationId, sender: UserId, text: &str) -> MessageId {
        let mut state = self.state.lock();
        let id = state.next_message_id;
        state.next_message_id += 1;
        state
            .messages
            .entry(conversation_id)
            .or_default()
            .push(FakeMessage {
                id,
                sender,
                text: text.to_string(),
            });
        if sender != state.me {
            *state.unread.entry(conversation_id).or_default() += 1;
        }
        id
    }

    pub fn set_unread(&self, conversation_id: ConversationId, count: u64) {
        self.state.lock().unread.insert(conversation_id, count);
    }

    pub fn unread(&self, conversation_id: ConversationId) -> u64 {
        self.state
            .lock()
            .unread
            .get(&conversation_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn reject_token(&self, reject: bool) {
        self.state.lock().reject_token = reject;
    }

    pub fn fail_conversations(&self, fail: bool) {
        self.state.lock().fail_conversations = fail;
    }

    pub fn fail_messages(&self, conversation_id: ConversationId, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.fail_messages.insert(conversation_id);
        } else {
            state.fail_messages.remove(&conversation_id);
        }
    }

    pub fn fail_unread(&self, conversation_id: ConversationId, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.fail_unread.insert(conversation_id);
        } else {
            state.fail_unread.remove(&conversation_id);
        }
    }

    pub fn fail_send(&self, fail: bool) {
        self.state.lock().fail_send = fail;
    }

    /// Wrap list responses in `{results: [...]}`
    pub fn paginate(&self, paginate: bool) {
        self.state.lock().paginate = paginate;
    }

    pub fn me_calls(&self) -> usize {
        self.me_calls.load(Ordering::SeqCst)
    }

    pub fn get_or_create_calls(&self) -> usize {
        self.get_or_create_calls.load(Ordering::SeqCst)
    }

    pub fn seen_calls(&self) -> Vec<ConversationId> {
        self.state.lock().seen.clone()
    }

    pub fn sent(&self) -> Vec<(ConversationId, OutgoingMessage)> {
        self.state.lock().sent.clone()
    }

    pub fn created(&self) -> Vec<GetOrCreateRequest> {
        self.state.lock().created.clone()
    }

    pub fn deleted(&self) -> Vec<ConversationId> {
        self.state.lock().deleted.clone()
    }

    pub fn conversation_count(&self) -> usize {
        self.state.lock().conversations.len()
    }

    fn check_token(state: &FakeState) -> Result<()> {
        if state.reject_token {
            Err(Error::Auth("401 Unauthorized".to_string()))
        } else {
            Ok(())
        }
    }

    fn user_json(state: &FakeState, id: UserId) -> Value {
        match state.users.iter().find(|u| u.id == id) {
            Some(user) => json!({"id": user.id, "username": user.name, "is_staff": user.is_staff}),
            None => json!({"id": id, "username": format!("user{}", id)}),
        }
    }

    fn conversation_json(state: &FakeState, conversation: &FakeConversation) -> Value {
        let participants: Vec<Value> = conversation
            .participants
            .iter()
            .map(|id| Self::user_json(state, *id))
            .collect();
        let mut value = json!({
            "id": conversation.id,
            "is_group": conversation.is_group,
            "group_name": conversation.group_name,
            "participants": participants,
            "created_by": conversation.created_by,
        });
        if !conversation.is_group {
            if let Some(other) = conversation.participants.iter().find(|id| **id != state.me) {
                value["other_user"] = Self::user_json(state, *other);
            }
        }
        value
    }

    fn message_json(state: &FakeState, message: &FakeMessage) -> Value {
        json!({
            "id": message.id,
            "sender": Self::user_json(state, message.sender),
            "text": message.text,
            "timestamp": "2024-05-01T12:00:00Z",
        })
    }

    fn list(state: &FakeState, items: Vec<Value>) -> Value {
        if state.paginate {
            json!({"count": items.len(), "results": items})
        } else {
            Value::Array(items)
        }
    }

    fn visible(state: &FakeState) -> Vec<&FakeConversation> {
        state
            .conversations
            .iter()
            .filter(|c| c.participants.contains(&state.me))
            .collect()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn fetch_me(&self) -> Result<Value> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        Self::check_token(&state)?;
        Ok(Self::user_json(&state, state.me))
    }

    async fn fetch_users(&self) -> Result<Value> {
        let state = self.state.lock();
        Self::check_token(&state)?;
        let users: Vec<Value> = state.users.iter().map(|u| Self::user_json(&state, u.id)).collect();
        Ok(Self::list(&state, users))
    }

    async fn fetch_conversations(&self) -> Result<Value> {
        let gate = self.conversation_gate.lock().take();
        if let Some((parked, release)) = gate {
            let _ = parked.send(());
            let _ = release.await;
        }

        let state = self.state.lock();
        Self::check_token(&state)?;
        if state.fail_conversations {
            return Err(Error::Transient("503 Service Unavailable".to_string()));
        }
        let items: Vec<Value> = Self::visible(&state)
            .into_iter()
            .map(|c| Self::conversation_json(&state, c))
            .collect();
        Ok(Self::list(&state, items))
    }

    async fn fetch_group_conversations(&self) -> Result<Value> {
        let state = self.state.lock();
        Self::check_token(&state)?;
        if state.fail_conversations {
            return Err(Error::Transient("503 Service Unavailable".to_string()));
        }
        let items: Vec<Value> = Self::visible(&state)
            .into_iter()
            .filter(|c| c.is_group)
            .map(|c| Self::conversation_json(&state, c))
            .collect();
        Ok(Self::list(&state, items))
    }

    async fn fetch_messages(&self, conversation_id: ConversationId) -> Result<Value> {
        let state = self.state.lock();
        Self::check_token(&state)?;
        if state.fail_messages.contains(&conversation_id) {
            return Err(Error::Transient("connection reset".to_string()));
        }
        let items: Vec<Value> = state
            .messages
            .get(&conversation_id)
            .map(|messages| messages.iter().map(|m| Self::message_json(&state, m)).collect())
            .unwrap_or_default();
        Ok(Self::list(&state, items))
    }

    async fn fetch_unread(&self, conversation_id: ConversationId) -> Result<Value> {
        let state = self.state.lock();
        Self::check_token(&state)?;
        if state.fail_unread.contains(&conversation_id) {
            return Err(Error::Transient("timeout".to_string()));
        }
        let count = state.unread.get(&conversation_id).copied().unwrap_or(0);
        Ok(json!({"unread": count}))
    }

    async fn mark_seen(&self, conversation_id: ConversationId) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_token(&state)?;
        state.seen.push(conversation_id);
        state.unread.insert(conversation_id, 0);
        Ok(())
    }

    async fn get_or_create_conversation(&self, request: &GetOrCreateRequest) -> Result<Value> {
        self.get_or_create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        Self::check_token(&state)?;
        state.created.push(request.clone());

        let wanted: BTreeSet<UserId> = request.participants.iter().copied().collect();
        let existing = state.conversations.iter().find(|c| {
            c.is_group == request.is_group
                && c.participants.iter().copied().collect::<BTreeSet<_>>() == wanted
                && (!c.is_group || c.group_name == request.group_name)
        });
        if let Some(existing) = existing {
            return Ok(Self::conversation_json(&state, existing));
        }

        let id = state.next_conversation_id;
        state.next_conversation_id += 1;
        let conversation = FakeConversation {
            id,
            participants: wanted.into_iter().collect(),
            is_group: request.is_group,
            group_name: request.group_name.clone(),
            created_by: Some(state.me),
        };
        let value = Self::conversation_json(&state, &conversation);
        state.conversations.push(conversation);
        Ok(value)
    }

    async fn send_message(
        &self,
        conversation_id: ConversationId,
        message: &OutgoingMessage,
    ) -> Result<Value> {
        {
            let mut state = self.state.lock();
            Self::check_token(&state)?;
            if state.fail_send {
                return Err(Error::Transient("502 Bad Gateway".to_string()));
            }
            state.sent.push((conversation_id, message.clone()));
        }

        let me = self.state.lock().me;
        let id = self.push_message(conversation_id, me, &message.text);
        let state = self.state.lock();
        Ok(json!({
            "id": id,
            "sender_id": me,
            "sender_username": Self::user_json(&state, me)["username"],
            "text": message.text,
        }))
    }

    async fn delete_group(&self, conversation_id: ConversationId) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_token(&state)?;
        let before = state.conversations.len();
        state
            .conversations
            .retain(|c| !(c.is_group && c.id == conversation_id));
        if state.conversations.len() == before {
            return Err(Error::Transient("404 Not Found".to_string()));
        }
        state.deleted.push(conversation_id);
        Ok(())
    }
}

/// Sink that records everything it is asked to do
#[derive(Default)]
pub struct RecordingSink {
    notified: Mutex<Vec<Notification>>,
    dismissed: AtomicUsize,
}

impl RecordingSink {
    pub fn notified(&self) -> Vec<Notification> {
        self.notified.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.notified.lock().len()
    }

    pub fn dismissed(&self) -> usize {
        self.dismissed.load(Ordering::SeqCst)
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: &Notification) {
        self.notified.lock().push(notification.clone());
    }

    fn dismiss_all(&self) {
        self.dismissed.fetch_add(1, Ordering::SeqCst);
    }
}

/// An engine over a fresh fake backend, logged in as [`ME`]
pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub credentials: Credentials,
    pub sink: Arc<RecordingSink>,
    pub engine: ChatEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let backend = Arc::new(FakeBackend::new());
        let credentials = Credentials::with_token("token-me");
        let sink = Arc::new(RecordingSink::default());
        let engine = ChatEngine::new(
            backend.clone(),
            credentials.clone(),
            &settings,
            sink.clone(),
            IntentStore::in_memory(),
        );

        Self {
            backend,
            credentials,
            sink,
            engine,
        }
    }
}

/// Settings with short intervals for paused-clock tests
pub fn test_settings() -> Settings {
    Settings {
        message_poll_interval_ms: 1_000,
        conversation_poll_interval_ms: 3_000,
        deep_link_retry_attempts: 3,
        deep_link_retry_delay_ms: 100,
        ..Settings::default()
    }
}
