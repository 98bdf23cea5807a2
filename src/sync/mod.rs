//! Sync loop
//!
//! Two periodic tasks poll the backend: the notifier (per-conversation tick)
//! and the unread watcher (conversation-list tick). A supervisor task starts
//! and stops them as the session and the viewing surface change:
//! - no credential: idle, with all session state cleared
//! - credential, hidden surface: suspended
//! - credential, visible surface: running, each task ticking immediately
//!
//! Any change of credential (login, logout, 401, token swap) resets the
//! session identity, the dedup ledger, the badges and the chat view, so the
//! next identity starts with a fresh bootstrap pass. Seen events are applied in
//! every state.

pub mod notifier;
pub mod scheduler;
pub mod unread;

pub use notifier::{Decision, Notifier, TickReport};
pub use scheduler::{PeriodicJob, PeriodicTask};
pub use unread::{UnreadSummary, UnreadWatcher};

use crate::{
    active::ActiveConversationTracker, controller::ChatSessionController,
    directory::ConversationDirectory, session::SessionContext, signals::SeenBus,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{info, warn};

/// Supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No credential, nothing polls
    Idle,
    /// Credential present but the surface is hidden
    Suspended,
    /// Both periodic tasks are scheduled
    Running,
    /// The supervisor has exited
    Stopped,
}

/// The sync loop, ready to be spawned
pub struct SyncLoop {
    session: Arc<SessionContext>,
    directory: Arc<ConversationDirectory>,
    notifier: Arc<Notifier>,
    unread: Arc<UnreadWatcher>,
    active: ActiveConversationTracker,
    seen: SeenBus,
    controller: Option<Arc<ChatSessionController>>,
    message_interval: Duration,
    conversation_interval: Duration,
}

impl SyncLoop {
    /// Assemble a sync loop
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Arc<SessionContext>,
        directory: Arc<ConversationDirectory>,
        notifier: Arc<Notifier>,
        unread: Arc<UnreadWatcher>,
        active: ActiveConversationTracker,
        seen: SeenBus,
        message_interval: Duration,
        conversation_interval: Duration,
    ) -> Self {
        Self {
            session,
            directory,
            notifier,
            unread,
            active,
            seen,
            controller: None,
            message_interval,
            conversation_interval,
        }
    }

    /// Also clear `controller` whenever the credential changes
    pub fn with_controller(mut self, controller: Arc<ChatSessionController>) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Spawn the supervisor
    pub fn spawn(self) -> SyncHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(LoopState::Idle);
        // Subscribe before spawning so no seen event published after this
        // call can be missed.
        let seen_rx = self.seen.subscribe();

        let join = tokio::spawn(self.supervise(shutdown_rx, state_tx, seen_rx));

        SyncHandle {
            shutdown: shutdown_tx,
            state: state_rx,
            join,
        }
    }

    async fn supervise(
        self,
        mut shutdown: watch::Receiver<bool>,
        state_tx: watch::Sender<LoopState>,
        mut seen: broadcast::Receiver<crate::signals::SeenAdvanced>,
    ) {
        let mut credentials = self.session.credentials().subscribe();
        let mut surface = self.active.subscribe_surface();

        let mut messages = PeriodicTask::new(self.notifier.clone(), self.message_interval);
        let mut conversations = PeriodicTask::new(self.unread.clone(), self.conversation_interval);

        let mut last_token: Option<String> = None;

        loop {
            let token = credentials.borrow_and_update().clone();
            let visible = surface.borrow_and_update().visible;

            if token != last_token {
                messages.stop().await;
                conversations.stop().await;
                self.reset_session_state();
                if token.is_some() {
                    info!("Credential available, sync will bootstrap");
                } else {
                    info!("Credential cleared, sync halted");
                }
                last_token = token.clone();
            }

            let desired = match (token.is_some(), visible) {
                (false, _) => LoopState::Idle,
                (true, false) => LoopState::Suspended,
                (true, true) => LoopState::Running,
            };

            if desired == LoopState::Running {
                messages.start();
                conversations.start();
            } else {
                messages.stop().await;
                conversations.stop().await;
            }

            state_tx.send_if_modified(|state| {
                if *state == desired {
                    return false;
                }
                info!("Sync loop {:?} -> {:?}", *state, desired);
                *state = desired;
                true
            });

            tokio::select! {
                changed = credentials.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = surface.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                event = seen.recv() => match event {
                    Ok(event) => {
                        self.notifier.apply_seen(event);
                        self.unread.apply_seen(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Badges fix themselves on the next conversation tick.
                        warn!("Missed {} seen event(s), replaying marks", skipped);
                        self.notifier.catch_up_seen(self.seen.marks());
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.changed() => break,
            }
        }

        messages.stop().await;
        conversations.stop().await;
        state_tx.send_replace(LoopState::Stopped);
        info!("Sync loop stopped");
    }

    fn reset_session_state(&self) {
        self.session.invalidate();
        self.seen.clear();
        self.notifier.reset();
        self.unread.reset();
        self.directory.reset();
        self.active.clear();
        if let Some(controller) = &self.controller {
            controller.reset();
        }
    }
}

/// Handle to a spawned sync loop
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<LoopState>,
    join: JoinHandle<()>,
}

impl SyncHandle {
    /// Current supervisor state
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.clone()
    }

    /// Wait until the supervisor reaches `target`
    pub async fn wait_for(&mut self, target: LoopState) {
        let _ = self.state.wait_for(|state| *state == target).await;
    }

    /// Stop both tasks and the supervisor
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}
