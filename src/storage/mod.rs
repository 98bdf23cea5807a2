//! Local data model and storage
//!
//! This module holds the engine's data model and its small amount of local state:
//! - `identity` - The authenticated user
//! - `conversation` - Direct and group conversations, get-or-create keys
//! - `message` - Messages and latest-message selection
//! - `intents` - Durable, consumed-once deep-link intents
//! - `settings` - Engine configuration

// Submodules
pub mod conversation;
pub mod identity;
pub mod intents;
pub mod message;
pub mod settings;

// Re-export commonly used types
pub use conversation::{Conversation, ConversationKey};
pub use identity::Identity;
pub use intents::{IntentStore, OpenIntent};
pub use message::{latest_message, Message};
pub use settings::Settings;
