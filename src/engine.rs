//! Engine assembly
//!
//! Wires the components around one backend and one credential store.

use crate::{
    active::ActiveConversationTracker,
    controller::ChatSessionController,
    directory::ConversationDirectory,
    fetcher::MessageFetcher,
    ledger::DedupLedger,
    notification::NotificationSink,
    session::{Credentials, SessionContext},
    signals::SeenBus,
    storage::{IntentStore, Settings},
    sync::{Notifier, SyncHandle, SyncLoop, UnreadWatcher},
    transport::{Backend, HttpBackend},
    Result,
};
use std::{sync::Arc, time::Duration};

/// All components of one chat session
pub struct ChatEngine {
    session: Arc<SessionContext>,
    directory: Arc<ConversationDirectory>,
    notifier: Arc<Notifier>,
    unread: Arc<UnreadWatcher>,
    active: ActiveConversationTracker,
    seen: SeenBus,
    controller: Arc<ChatSessionController>,
    message_interval: Duration,
    conversation_interval: Duration,
}

impl ChatEngine {
    /// Assemble an engine over `backend`
    pub fn new(
        backend: Arc<dyn Backend>,
        credentials: Credentials,
        settings: &Settings,
        sink: Arc<dyn NotificationSink>,
        intents: IntentStore,
    ) -> Self {
        let session = Arc::new(SessionContext::new(backend.clone(), credentials));
        let directory = Arc::new(ConversationDirectory::new(backend.clone(), session.clone()));
        let fetcher = Arc::new(MessageFetcher::new(backend.clone(), session.clone()));
        let active = ActiveConversationTracker::new();
        let seen = SeenBus::new();

        let notifier = Notifier::new(
            session.clone(),
            directory.clone(),
            fetcher.clone(),
            Arc::new(DedupLedger::new()),
            active.clone(),
            sink,
        )
        .with_preview_max_chars(settings.preview_max_chars);
        notifier.set_enabled(settings.enable_notifications);
        let notifier = Arc::new(notifier);

        let unread = Arc::new(UnreadWatcher::new(
            session.clone(),
            directory.clone(),
            fetcher.clone(),
        ));

        let controller = ChatSessionController::new(
            backend,
            session.clone(),
            directory.clone(),
            fetcher,
            active.clone(),
            seen.clone(),
            unread.clone(),
            Arc::new(intents),
        )
        .with_deep_link_retry(
            settings.deep_link_retry_attempts,
            settings.deep_link_retry_delay(),
        );

        Self {
            session,
            directory,
            notifier,
            unread,
            active,
            seen,
            controller: Arc::new(controller),
            message_interval: settings.message_poll_interval(),
            conversation_interval: settings.conversation_poll_interval(),
        }
    }

    /// Assemble an engine talking HTTP to `settings.api_base_url`
    pub fn with_http(
        settings: &Settings,
        credentials: Credentials,
        sink: Arc<dyn NotificationSink>,
        intents: IntentStore,
    ) -> Result<Self> {
        let backend = HttpBackend::new(settings, credentials.clone())?;
        Ok(Self::new(
            Arc::new(backend),
            credentials,
            settings,
            sink,
            intents,
        ))
    }

    /// Start the sync loop
    pub fn spawn_sync(&self) -> SyncHandle {
        SyncLoop::new(
            self.session.clone(),
            self.directory.clone(),
            self.notifier.clone(),
            self.unread.clone(),
            self.active.clone(),
            self.seen.clone(),
            self.message_interval,
            self.conversation_interval,
        )
        .with_controller(self.controller.clone())
        .spawn()
    }

    /// Session context
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Conversation directory
    pub fn directory(&self) -> &Arc<ConversationDirectory> {
        &self.directory
    }

    /// New-message notifier
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Unread badge watcher
    pub fn unread(&self) -> &Arc<UnreadWatcher> {
        &self.unread
    }

    /// Active conversation marker and surface state
    pub fn active(&self) -> &ActiveConversationTracker {
        &self.active
    }

    /// Seen broadcast
    pub fn seen(&self) -> &SeenBus {
        &self.seen
    }

    /// Chat view controller
    pub fn controller(&self) -> &Arc<ChatSessionController> {
        &self.controller
    }
}
