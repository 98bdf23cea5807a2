//! Authenticated user identity

use crate::UserId;
use serde::{Deserialize, Serialize};

/// A user as seen by the messaging engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// User ID
    pub id: UserId,
    /// Display name (the backend's username)
    pub display_name: String,
    /// Staff users may delete any group
    #[serde(default)]
    pub is_staff: bool,
}

impl Identity {
    /// Create a non-staff identity
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_staff: false,
        }
    }

    /// Compare a sender against this identity
    ///
    /// Matches on ID, or on display name after trimming and case folding.
    pub fn is_sender(&self, sender_id: Option<UserId>, sender_name: Option<&str>) -> bool {
        if sender_id.is_some_and(|id| id != 0 && id == self.id) {
            return true;
        }

        let mine = normalize_name(&self.display_name);
        match sender_name.map(normalize_name) {
            Some(theirs) => !mine.is_empty() && !theirs.is_empty() && mine == theirs,
            None => false,
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
