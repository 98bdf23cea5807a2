//! Protocol module
//!
//! This module defines the REST wire shapes used by the engine:
//! - Request bodies (get-or-create, outgoing messages)
//! - Normalization of heterogeneous backend payloads into the data model
//!
//! The backend is inconsistent about envelope and field names: lists may be bare
//! arrays or paginated `{ "results": [...] }` objects, identifiers may be numbers
//! or numeric strings, and several fields have historical aliases. Normalization
//! never fails on a malformed element; it drops it instead.

use crate::{
    storage::{Conversation, ConversationKey, Identity, Message},
    ConversationId, UserId,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/conversations/get_or_create/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetOrCreateRequest {
    /// Participant IDs, including the requesting user
    pub participants: Vec<UserId>,
    /// Group flag, omitted for direct conversations
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_group: bool,
    /// Group name, omitted for direct conversations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
}

impl From<&ConversationKey> for GetOrCreateRequest {
    fn from(key: &ConversationKey) -> Self {
        Self {
            participants: key.participants.iter().copied().collect(),
            is_group: key.is_group,
            group_name: key.group_name.clone(),
        }
    }
}

/// A single binary attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name reported to the backend
    pub file_name: String,
    /// MIME type, if known
    pub mime_type: Option<String>,
    /// File contents
    pub data: Bytes,
}

impl Attachment {
    /// Create an attachment
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: None,
            data: data.into(),
        }
    }

    /// Set the MIME type
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Body of `POST /api/chat/{id}/messages/` (sent as multipart form)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingMessage {
    /// Text, possibly empty when an attachment is present
    pub text: String,
    /// Optional attachment
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    /// Whether there is anything to send
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachment.is_none()
    }
}

/// Unwrap a list payload: a bare array or a paginated `{ "results": [...] }`
pub fn list_items(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Read a non-zero identifier from a number or numeric string
pub fn parse_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|id| *id != 0)
}

/// First field present (and not null) among `keys`
fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find(|v| !v.is_null())
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .next()
}

/// Normalize a user object, or a bare user ID
pub fn normalize_user(value: &Value) -> Option<Identity> {
    if let Some(id) = parse_id(value) {
        return Some(Identity::new(id, ""));
    }

    let id = field(value, &["id", "pk"]).and_then(parse_id)?;
    let name = string_field(value, &["username", "name", "display_name"]).unwrap_or_default();
    let is_staff = value
        .get("is_staff")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Some(Identity {
        id,
        display_name: name,
        is_staff,
    })
}

/// Normalize the `/api/me/` payload: `{id, username}` or `{user: {id, username}}`
pub fn normalize_identity(payload: &Value) -> Option<Identity> {
    normalize_user(payload).or_else(|| payload.get("user").and_then(normalize_user))
}

/// Normalize one conversation; `None` when it has no usable identifier
pub fn normalize_conversation(value: &Value) -> Option<Conversation> {
    let id = field(value, &["id", "conversation_id", "pk"]).and_then(parse_id)?;

    let participants = field(value, &["participants", "users"])
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(normalize_user).collect())
        .unwrap_or_default();

    let created_by = value.get("created_by").and_then(|v| {
        parse_id(v).or_else(|| field(v, &["id", "pk"]).and_then(parse_id))
    });

    Some(Conversation {
        id,
        is_group: value
            .get("is_group")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        group_name: string_field(value, &["group_name", "title", "name"]),
        other_participant: value.get("other_user").and_then(normalize_user),
        participants,
        created_by,
    })
}

/// Normalize a conversation list payload, dropping unusable entries
pub fn normalize_conversations(payload: Value) -> Vec<Conversation> {
    let items = list_items(payload);
    let total = items.len();
    let conversations: Vec<Conversation> =
        items.iter().filter_map(normalize_conversation).collect();

    if conversations.len() < total {
        tracing::debug!(
            "Dropped {} conversation(s) without a usable identifier",
            total - conversations.len()
        );
    }
    conversations
}

/// Normalize one message; `None` when it has no usable identifier
pub fn normalize_message(value: &Value, conversation_id: ConversationId) -> Option<Message> {
    let id = value.get("id").and_then(parse_id)?;

    let sender = value.get("sender");
    let sender_id = field(value, &["sender_id"])
        .and_then(parse_id)
        .or_else(|| sender.and_then(parse_id))
        .or_else(|| sender.and_then(|s| s.get("id")).and_then(parse_id))
        .or_else(|| field(value, &["created_by_id", "user_id"]).and_then(parse_id));

    let sender_name = string_field(value, &["sender_username"])
        .or_else(|| sender.and_then(|s| string_field(s, &["username"])))
        .or_else(|| string_field(value, &["author"]))
        .or_else(|| value.get("user").and_then(|u| string_field(u, &["username"])));

    let timestamp = string_field(value, &["timestamp", "created_at"]).and_then(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .ok()
    });

    Some(Message {
        id,
        conversation_id,
        sender_id,
        sender_name,
        text: string_field(value, &["text", "content"]),
        attachment: string_field(value, &["attachment"]).filter(|a| !a.is_empty()),
        timestamp,
    })
}

/// Normalize a message list payload, ordered by ascending ID
pub fn normalize_messages(payload: Value, conversation_id: ConversationId) -> Vec<Message> {
    let mut messages: Vec<Message> = list_items(payload)
        .iter()
        .filter_map(|m| normalize_message(m, conversation_id))
        .collect();
    messages.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.timestamp.cmp(&b.timestamp)));
    messages
}

/// Read an unread counter: a bare number or `{unread: n}` / `{count: n}`
///
/// Anything else reads as zero.
pub fn parse_unread(payload: &Value) -> u64 {
    let raw = match payload {
        Value::Object(_) => field(payload, &["unread", "count"]),
        other => Some(other),
    };

    match raw {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}
