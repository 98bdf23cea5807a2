//! Active conversation tracking
//!
//! Shared, process-wide signal of which conversation the user is viewing and
//! whether the viewing surface is visible and focused.

use crate::ConversationId;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

/// Visibility of the viewing surface (window, tab, terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceState {
    /// Surface is shown
    pub visible: bool,
    /// Surface has input focus
    pub focused: bool,
}

impl SurfaceState {
    /// Shown and focused
    pub const FOREGROUND: Self = Self {
        visible: true,
        focused: true,
    };

    /// Hidden
    pub const HIDDEN: Self = Self {
        visible: false,
        focused: false,
    };

    /// Whether the user can be assumed to be reading the surface
    pub fn is_attended(&self) -> bool {
        self.visible && self.focused
    }
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self::FOREGROUND
    }
}

/// Active conversation marker plus surface state
///
/// Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct ActiveConversationTracker {
    marker: Arc<RwLock<Option<ConversationId>>>,
    surface: Arc<watch::Sender<SurfaceState>>,
}

impl ActiveConversationTracker {
    /// Create a tracker with no active conversation and a foreground surface
    pub fn new() -> Self {
        let (surface, _rx) = watch::channel(SurfaceState::default());
        Self {
            marker: Arc::new(RwLock::new(None)),
            surface: Arc::new(surface),
        }
    }

    /// Mark a conversation as open
    pub fn set_active(&self, conversation_id: ConversationId) {
        *self.marker.write() = Some(conversation_id);
    }

    /// Clear the marker (navigated away)
    pub fn clear(&self) {
        self.marker.write().take();
    }

    /// Clear the marker only if it still points at `conversation_id`
    pub fn clear_if(&self, conversation_id: ConversationId) {
        let mut marker = self.marker.write();
        if *marker == Some(conversation_id) {
            *marker = None;
        }
    }

    /// The open conversation, if any
    pub fn active(&self) -> Option<ConversationId> {
        *self.marker.read()
    }

    /// Report a surface change
    pub fn set_surface(&self, state: SurfaceState) {
        self.surface.send_replace(state);
    }

    /// Current surface state
    pub fn surface(&self) -> SurfaceState {
        *self.surface.borrow()
    }

    /// Subscribe to surface changes
    pub fn subscribe_surface(&self) -> watch::Receiver<SurfaceState> {
        self.surface.subscribe()
    }

    /// Whether the user is currently reading `conversation_id`
    pub fn is_viewing(&self, conversation_id: ConversationId) -> bool {
        self.active() == Some(conversation_id) && self.surface().is_attended()
    }
}

impl Default for ActiveConversationTracker {
    fn default() -> Self {
        Self::new()
    }
}
