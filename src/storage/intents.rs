//! Deep-link intents
//!
//! An intent asks the chat view to open a conversation, e.g. after a
//! notification click. Intents are durable and consumed once: the writer
//! stores, the consumer takes (reads and clears).

use crate::{ConversationId, Error, Result, UserId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Request to open a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpenIntent {
    /// Open (or create) the direct conversation with a user
    Direct {
        /// The other user
        user_id: UserId,
    },
    /// Open an existing group conversation
    Group {
        /// The group conversation
        conversation_id: ConversationId,
    },
}

/// Single-slot store for a pending [`OpenIntent`]
///
/// With a path, the slot is mirrored to a JSON file so it survives a reload.
#[derive(Debug)]
pub struct IntentStore {
    slot: Mutex<Option<OpenIntent>>,
    path: Option<PathBuf>,
}

impl IntentStore {
    /// Create an in-memory store
    pub fn in_memory() -> Self {
        Self {
            slot: Mutex::new(None),
            path: None,
        }
    }

    /// Create a store backed by a JSON file, loading any pending intent
    ///
    /// A missing or empty file means no pending intent.
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let pending = if path.exists() {
            let data = std::fs::read_to_string(&path)
                .map_err(|e| Error::Storage(format!("Failed to read intent file: {}", e)))?;
            if data.trim().is_empty() {
                None
            } else {
                serde_json::from_str(&data)?
            }
        } else {
            None
        };

        Ok(Self {
            slot: Mutex::new(pending),
            path: Some(path),
        })
    }

    /// Store an intent, replacing any pending one
    pub fn request(&self, intent: OpenIntent) -> Result<()> {
        let mut slot = self.slot.lock();
        *slot = Some(intent);
        self.persist(&slot)
    }

    /// Take the pending intent, clearing the slot
    pub fn take(&self) -> Result<Option<OpenIntent>> {
        let mut slot = self.slot.lock();
        let intent = slot.take();
        if intent.is_some() {
            self.persist(&slot)?;
        }
        Ok(intent)
    }

    /// Put an intent back unless a newer one arrived meanwhile
    pub fn restore(&self, intent: OpenIntent) -> Result<()> {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(intent);
            self.persist(&slot)?;
        }
        Ok(())
    }

    /// Peek at the pending intent without consuming it
    pub fn pending(&self) -> Option<OpenIntent> {
        *self.slot.lock()
    }

    fn persist(&self, slot: &Option<OpenIntent>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create intent directory: {}", e)))?;
        }

        let json = match slot {
            Some(intent) => serde_json::to_string(intent)?,
            None => String::new(),
        };
        std::fs::write(path, json)
            .map_err(|e| Error::Storage(format!("Failed to write intent file: {}", e)))?;
        Ok(())
    }
}

impl Default for IntentStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
