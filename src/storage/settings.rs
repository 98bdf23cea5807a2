//! Engine settings and configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine settings
///
/// Persistent configuration for the messaging engine.
/// Settings are stored in JSON format and can be loaded/saved from disk.
///
/// # Example
/// ```rust,no_run
/// use ticktask_chat::storage::Settings;
///
/// // Load settings (returns default if file doesn't exist)
/// let settings = Settings::load("settings.json").expect("Failed to load");
///
/// println!("Polling every {:?}", settings.message_poll_interval());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the REST backend
    pub api_base_url: String,
    /// Per-conversation notification tick interval in milliseconds
    pub message_poll_interval_ms: u64,
    /// Conversation-list (badge) tick interval in milliseconds
    pub conversation_poll_interval_ms: u64,
    /// Emit notifications (the ledger is advanced either way)
    pub enable_notifications: bool,
    /// Maximum characters of message text shown in a notification
    pub preview_max_chars: usize,
    /// How many times a deep link waits for the conversation list
    pub deep_link_retry_attempts: u32,
    /// Delay between deep-link attempts in milliseconds
    pub deep_link_retry_delay_ms: u64,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Settings {
    /// Load settings from a JSON file
    ///
    /// # Returns
    /// The loaded settings, or default settings if the file doesn't exist or is empty
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Storage(format!("Failed to read settings: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut settings: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Storage(format!("Failed to parse settings: {}", e)))?;
        settings.clamp_intervals();

        Ok(settings)
    }

    /// Save settings to a JSON file, creating parent directories
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create settings directory: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Storage(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, json)
            .map_err(|e| Error::Storage(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    /// Per-conversation notification tick interval
    pub fn message_poll_interval(&self) -> Duration {
        Duration::from_millis(self.message_poll_interval_ms)
    }

    /// Conversation-list tick interval
    pub fn conversation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.conversation_poll_interval_ms)
    }

    /// Delay between deep-link attempts
    pub fn deep_link_retry_delay(&self) -> Duration {
        Duration::from_millis(self.deep_link_retry_delay_ms)
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// `tokio::time::interval` panics on a zero period
    fn clamp_intervals(&mut self) {
        self.message_poll_interval_ms = self.message_poll_interval_ms.max(MIN_POLL_INTERVAL_MS);
        self.conversation_poll_interval_ms =
            self.conversation_poll_interval_ms.max(MIN_POLL_INTERVAL_MS);
    }
}

/// Lower bound for both poll intervals
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            message_poll_interval_ms: 5_000,
            conversation_poll_interval_ms: 15_000,
            enable_notifications: true,
            preview_max_chars: 120,
            deep_link_retry_attempts: 5,
            deep_link_retry_delay_ms: 500,
            request_timeout_ms: 10_000,
        }
    }
}
