//! New-message notifier
//!
//! One tick walks every conversation and decides whether its latest message
//! deserves a notification. The first tick of a session is the bootstrap pass:
//! it only records the current latest message of each conversation, so that
//! history which already existed at login never produces a notification.

use crate::{
    active::ActiveConversationTracker,
    directory::ConversationDirectory,
    fetcher::MessageFetcher,
    ledger::DedupLedger,
    notification::{Notification, NotificationSink},
    session::SessionContext,
    signals::SeenAdvanced,
    storage::{Conversation, Identity},
    sync::scheduler::PeriodicJob,
    Error, Result,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

/// Outcome of evaluating one conversation in a steady-state tick
#[derive(Debug)]
pub enum Decision {
    /// The user is reading this conversation
    Viewing,
    /// The conversation has no messages yet
    NoMessages,
    /// The latest message is the user's own
    OwnMessage,
    /// The backend reports nothing unread
    NoUnread,
    /// The latest message was already notified (or seen)
    AlreadyNotified,
    /// A notification was emitted
    Notified(Notification),
    /// Fetching failed; retried next tick
    Failed(Error),
}

/// Summary of one tick
#[derive(Debug, Default)]
pub struct TickReport {
    /// No identity was available, nothing was polled
    pub idle: bool,
    /// This tick was the bootstrap pass
    pub bootstrap: bool,
    /// Conversations examined
    pub conversations: usize,
    /// Notifications emitted
    pub notified: Vec<Notification>,
    /// Conversations whose fetch failed
    pub failed: usize,
}

/// Decides and emits new-message notifications
pub struct Notifier {
    session: Arc<SessionContext>,
    directory: Arc<ConversationDirectory>,
    fetcher: Arc<MessageFetcher>,
    ledger: Arc<DedupLedger>,
    active: ActiveConversationTracker,
    sink: Arc<dyn NotificationSink>,
    enabled: AtomicBool,
    preview_max_chars: usize,
}

impl Notifier {
    /// Create a notifier
    pub fn new(
        session: Arc<SessionContext>,
        directory: Arc<ConversationDirectory>,
        fetcher: Arc<MessageFetcher>,
        ledger: Arc<DedupLedger>,
        active: ActiveConversationTracker,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            session,
            directory,
            fetcher,
            ledger,
            active,
            sink,
            enabled: AtomicBool::new(true),
            preview_max_chars: 120,
        }
    }

    /// Set the preview length
    pub fn with_preview_max_chars(mut self, max_chars: usize) -> Self {
        self.preview_max_chars = max_chars;
        self
    }

    /// Enable or disable emission
    ///
    /// While disabled the ledger still advances, so re-enabling does not replay
    /// messages that arrived in between.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// The dedup ledger
    pub fn ledger(&self) -> &Arc<DedupLedger> {
        &self.ledger
    }

    /// Run one tick
    ///
    /// Errors are returned only when the tick as a whole could not run (no
    /// conversation list, failed bootstrap, or an authorization failure).
    pub async fn tick(&self) -> Result<TickReport> {
        let Some(me) = self.session.current_identity().await? else {
            return Ok(TickReport {
                idle: true,
                ..TickReport::default()
            });
        };

        let conversations = self.directory.list_conversations().await?;

        if !self.ledger.is_bootstrapped() {
            return self.bootstrap(&conversations).await;
        }

        let decisions = join_all(conversations.iter().map(|c| self.evaluate(&me, c))).await;

        let mut report = TickReport {
            conversations: conversations.len(),
            ..TickReport::default()
        };
        let mut auth_error = None;
        for decision in decisions {
            match decision {
                Decision::Notified(notification) => report.notified.push(notification),
                Decision::Failed(e) if e.is_auth() => {
                    report.failed += 1;
                    auth_error = Some(e);
                }
                Decision::Failed(_) => report.failed += 1,
                _ => {}
            }
        }

        match auth_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Record the latest message of every conversation without notifying
    ///
    /// All-or-nothing: if any fetch fails the ledger stays unbootstrapped and
    /// the pass is retried on the next tick.
    async fn bootstrap(&self, conversations: &[Conversation]) -> Result<TickReport> {
        let results = join_all(conversations.iter().map(|c| async move {
            self.fetcher
                .latest_message(c.id)
                .await
                .map(|last| (c.id, last.map(|m| m.id).unwrap_or(0)))
        }))
        .await;

        let marks = results.into_iter().collect::<Result<Vec<_>>>()?;
        self.ledger.bootstrap(marks);
        info!(
            "Notifier bootstrapped with {} conversation(s)",
            conversations.len()
        );

        Ok(TickReport {
            bootstrap: true,
            conversations: conversations.len(),
            ..TickReport::default()
        })
    }

    /// Evaluate one conversation
    pub async fn evaluate(&self, me: &Identity, conversation: &Conversation) -> Decision {
        if self.active.is_viewing(conversation.id) {
            return Decision::Viewing;
        }

        let snapshot = match self.fetcher.snapshot(conversation.id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("Skipping conversation {} this tick: {}", conversation.id, e);
                return Decision::Failed(e);
            }
        };

        let Some(last) = snapshot.last else {
            return Decision::NoMessages;
        };
        if me.is_sender(last.sender_id, last.sender_name.as_deref()) {
            return Decision::OwnMessage;
        }
        if snapshot.unread == 0 {
            return Decision::NoUnread;
        }
        // The user may have opened the conversation while we were fetching.
        if self.active.is_viewing(conversation.id) {
            return Decision::Viewing;
        }
        if !self.ledger.try_claim(conversation.id, last.id) {
            return Decision::AlreadyNotified;
        }

        let notification =
            Notification::for_message(conversation, &last, me, self.preview_max_chars);
        if self.enabled.load(Ordering::Relaxed) {
            self.sink.notify(&notification);
        }
        debug!(
            "Notified message {} in conversation {} (unread {})",
            last.id, conversation.id, snapshot.unread
        );
        Decision::Notified(notification)
    }

    /// Apply a seen advance to the ledger
    pub fn apply_seen(&self, event: SeenAdvanced) {
        let mark = self.ledger.advance_seen(event.conversation_id, event.up_to);
        debug!(
            "Seen advanced in conversation {} to {} (mark {})",
            event.conversation_id, event.up_to, mark
        );
        self.sink.dismiss_all();
    }

    /// Re-apply seen marks after missing some events
    ///
    /// Marks only ever move forward, so replaying ones already applied is
    /// harmless.
    pub fn catch_up_seen(&self, marks: impl IntoIterator<Item = SeenAdvanced>) {
        let mut replayed = 0;
        for event in marks {
            self.ledger.advance_seen(event.conversation_id, event.up_to);
            replayed += 1;
        }
        debug!("Replayed {} seen mark(s)", replayed);
        self.sink.dismiss_all();
    }

    /// Forget everything learned this session
    pub fn reset(&self) {
        self.ledger.reset();
    }
}

#[async_trait]
impl PeriodicJob for Notifier {
    fn name(&self) -> &'static str {
        "notifier"
    }

    async fn run(&self) {
        match self.tick().await {
            Ok(report) if !report.notified.is_empty() => {
                debug!("Notifier tick emitted {} notification(s)", report.notified.len());
            }
            Ok(_) => {}
            Err(e) if e.is_auth() => warn!("Notifier halted: {}", e),
            Err(e) => debug!("Notifier tick skipped: {}", e),
        }
    }
}
