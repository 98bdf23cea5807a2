//! TickTask Chat - message synchronization and notification engine
//!
//! This library keeps the dashboard's conversations (direct and group) in sync
//! with the REST backend by periodic polling, and decides when a "new message"
//! notification should be surfaced without duplicating or losing events.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod active;
pub mod controller;
pub mod directory;
pub mod engine;
pub mod fetcher;
pub mod ledger;
pub mod notification;
pub mod protocol;
pub mod session;
pub mod signals;
pub mod storage;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod tests;

/// Backend-assigned conversation identifier
pub type ConversationId = u64;

/// Backend-assigned user identifier
pub type UserId = u64;

/// Message identifier, monotonically increasing within a conversation
pub type MessageId = u64;

/// Result type alias for TickTask Chat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for TickTask Chat operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing, invalid or expired credential
    #[error("Authorization error: {0}")]
    Auth(String),

    /// Network or backend failure, retried on the next tick
    #[error("Transient error: {0}")]
    Transient(String),

    /// Rejected user input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conversation could not be resolved from the directory
    #[error("Unknown conversation: {0}")]
    UnknownConversation(String),

    /// Local file storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error means the credential is no longer usable
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// Whether this error should simply be retried on the next tick
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(reqwest::StatusCode::UNAUTHORIZED) => Error::Auth(e.to_string()),
            _ => Error::Transient(e.to_string()),
        }
    }
}

/// Initialize logging for the library
///
/// Honors `RUST_LOG`, defaulting to `info`.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
