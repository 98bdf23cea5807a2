//! Conversation structures

use crate::{
    storage::{identity::Identity, intents::OpenIntent, message::Message},
    ConversationId, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A direct or group conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation ID
    pub id: ConversationId,
    /// Whether this is a group conversation
    pub is_group: bool,
    /// Group name, for groups
    pub group_name: Option<String>,
    /// The other participant of a direct conversation, when the backend reports it
    pub other_participant: Option<Identity>,
    /// All participants in backend order
    pub participants: Vec<Identity>,
    /// Creator of the conversation, for groups
    pub created_by: Option<UserId>,
}

impl Conversation {
    /// Create a direct conversation between two users
    pub fn direct(id: ConversationId, me: Identity, other: Identity) -> Self {
        Self {
            id,
            is_group: false,
            group_name: None,
            other_participant: Some(other.clone()),
            participants: vec![me, other],
            created_by: None,
        }
    }

    /// Create a group conversation
    pub fn group(
        id: ConversationId,
        name: impl Into<String>,
        participants: Vec<Identity>,
        created_by: Option<UserId>,
    ) -> Self {
        Self {
            id,
            is_group: true,
            group_name: Some(name.into()),
            other_participant: None,
            participants,
            created_by,
        }
    }

    /// The other side of a direct conversation
    ///
    /// Uses the reported other participant, else the single participant that is not `me`.
    pub fn counterpart(&self, me: &Identity) -> Option<&Identity> {
        if self.is_group {
            return None;
        }
        if let Some(other) = self.other_participant.as_ref().filter(|o| o.id != 0) {
            return Some(other);
        }

        let mut others = self.participants.iter().filter(|p| p.id != me.id);
        match (others.next(), others.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    /// Human readable title for notifications and headers
    pub fn title(&self, me: &Identity, last: Option<&Message>) -> String {
        if self.is_group {
            return self
                .group_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Group #{}", self.id));
        }

        if let Some(last) = last {
            if !me.is_sender(last.sender_id, last.sender_name.as_deref()) {
                if let Some(name) = last.sender_name.as_ref().filter(|n| !n.is_empty()) {
                    return name.clone();
                }
            }
        }

        self.counterpart(me)
            .map(|p| p.display_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Conversation #{}", self.id))
    }

    /// Deep-link intent that reopens this conversation in the chat view
    pub fn open_intent(&self, me: &Identity) -> OpenIntent {
        if self.is_group {
            return OpenIntent::Group {
                conversation_id: self.id,
            };
        }
        match self.counterpart(me) {
            Some(other) => OpenIntent::Direct { user_id: other.id },
            None => OpenIntent::Group {
                conversation_id: self.id,
            },
        }
    }

    /// Whether `user` may delete this group
    pub fn can_delete(&self, user: &Identity) -> bool {
        self.is_group && (user.is_staff || self.created_by == Some(user.id))
    }
}

/// Identity of a get-or-create request
///
/// Two opens with the same key must resolve to the same backend conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey {
    /// Sorted, de-duplicated participant IDs
    pub participants: BTreeSet<UserId>,
    /// Group flag
    pub is_group: bool,
    /// Trimmed group name, for groups
    pub group_name: Option<String>,
}

impl ConversationKey {
    /// Key of a direct conversation
    pub fn direct(me: UserId, other: UserId) -> Self {
        Self {
            participants: [me, other].into_iter().collect(),
            is_group: false,
            group_name: None,
        }
    }

    /// Key of a group conversation
    pub fn group(participants: impl IntoIterator<Item = UserId>, name: &str) -> Self {
        Self {
            participants: participants.into_iter().filter(|id| *id != 0).collect(),
            is_group: true,
            group_name: Some(name.trim().to_string()),
        }
    }
}
