//! Notification dedup ledger
//!
//! Per-conversation high-water mark of the last message ID that produced a
//! notification. Marks only ever move up; every operation is a single
//! synchronous check-and-assign under the lock, so callers never read a mark
//! before an await and write it after.

use crate::{ConversationId, MessageId};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct LedgerState {
    bootstrapped: bool,
    marks: HashMap<ConversationId, MessageId>,
}

/// Process-wide dedup ledger
#[derive(Debug, Default)]
pub struct DedupLedger {
    state: Mutex<LedgerState>,
}

impl DedupLedger {
    /// Create an empty, unbootstrapped ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the bootstrap pass has completed for this session
    pub fn is_bootstrapped(&self) -> bool {
        self.state.lock().bootstrapped
    }

    /// Record the bootstrap pass
    ///
    /// Seeds each conversation's mark with its current latest message ID and
    /// flips the ledger to tracking. Existing marks are never lowered.
    pub fn bootstrap<I>(&self, marks: I)
    where
        I: IntoIterator<Item = (ConversationId, MessageId)>,
    {
        let mut state = self.state.lock();
        for (conversation_id, message_id) in marks {
            let mark = state.marks.entry(conversation_id).or_insert(0);
            *mark = (*mark).max(message_id);
        }
        state.bootstrapped = true;
    }

    /// Current mark of a conversation (0 when untracked)
    pub fn mark(&self, conversation_id: ConversationId) -> MessageId {
        self.state
            .lock()
            .marks
            .get(&conversation_id)
            .copied()
            .unwrap_or(0)
    }

    /// Claim the right to notify for `message_id`
    ///
    /// Returns `true` and raises the mark when `message_id` is above it; the
    /// caller must then emit the notification. Returns `false` otherwise.
    pub fn try_claim(&self, conversation_id: ConversationId, message_id: MessageId) -> bool {
        let mut state = self.state.lock();
        let mark = state.marks.entry(conversation_id).or_insert(0);
        if message_id > *mark {
            *mark = message_id;
            true
        } else {
            false
        }
    }

    /// Apply a seen advance: `mark := max(mark, up_to)`
    ///
    /// Returns the resulting mark.
    pub fn advance_seen(&self, conversation_id: ConversationId, up_to: MessageId) -> MessageId {
        let mut state = self.state.lock();
        let mark = state.marks.entry(conversation_id).or_insert(0);
        *mark = (*mark).max(up_to);
        *mark
    }

    /// Clear every mark and the bootstrapped flag
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.marks.clear();
        state.bootstrapped = false;
    }

    /// Number of tracked conversations
    pub fn len(&self) -> usize {
        self.state.lock().marks.len()
    }

    /// Whether no conversation is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
