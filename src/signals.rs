//! Cross-component signals

use crate::{ConversationId, MessageId};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the seen broadcast; slow listeners lag past this
const SEEN_CHANNEL_CAPACITY: usize = 64;

/// The user has read a conversation up to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeenAdvanced {
    /// Conversation that was read
    pub conversation_id: ConversationId,
    /// Newest message ID the user has now seen
    pub up_to: MessageId,
}

/// Broadcast of [`SeenAdvanced`] events to any number of listeners
///
/// Cloning shares the same channel. The bus also keeps the newest mark per
/// conversation, so a listener that lagged can catch up with [`Self::marks`].
#[derive(Debug, Clone)]
pub struct SeenBus {
    tx: broadcast::Sender<SeenAdvanced>,
    marks: Arc<Mutex<HashMap<ConversationId, MessageId>>>,
}

impl SeenBus {
    /// Create a bus with no listeners
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(SEEN_CHANNEL_CAPACITY);
        Self {
            tx,
            marks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish an event; returns how many listeners received it
    pub fn publish(&self, event: SeenAdvanced) -> usize {
        {
            let mut marks = self.marks.lock();
            let mark = marks.entry(event.conversation_id).or_default();
            *mark = (*mark).max(event.up_to);
        }

        match self.tx.send(event) {
            Ok(listeners) => listeners,
            Err(_) => {
                debug!(
                    "No listeners for seen event on conversation {}",
                    event.conversation_id
                );
                0
            }
        }
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<SeenAdvanced> {
        self.tx.subscribe()
    }

    /// Newest published mark of every conversation
    pub fn marks(&self) -> Vec<SeenAdvanced> {
        self.marks
            .lock()
            .iter()
            .map(|(&conversation_id, &up_to)| SeenAdvanced {
                conversation_id,
                up_to,
            })
            .collect()
    }

    /// Forget the recorded marks
    pub fn clear(&self) {
        self.marks.lock().clear();
    }
}

impl Default for SeenBus {
    fn default() -> Self {
        Self::new()
    }
}
