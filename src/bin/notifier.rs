//! TickTask headless notifier
//!
//! Polls the chat backend and logs new-message notifications until Ctrl-C.
//!
//! Usage: `ticktask-notifier [settings.json]`, with the access token in
//! `TICKTASK_TOKEN`.

use anyhow::{bail, Context};
use std::sync::Arc;
use ticktask_chat::{
    engine::ChatEngine,
    notification::LogSink,
    session::Credentials,
    storage::{IntentStore, Settings},
};
use tracing::info;

const DEFAULT_SETTINGS_PATH: &str = "ticktask-settings.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ticktask_chat::init();

    let settings_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TICKTASK_SETTINGS").ok())
        .unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string());
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path))?;
    if !std::path::Path::new(&settings_path).exists() {
        settings
            .save(&settings_path)
            .with_context(|| format!("failed to write default settings to {}", settings_path))?;
        info!("Wrote default settings to {}", settings_path);
    }

    let token = match std::env::var("TICKTASK_TOKEN") {
        Ok(token) if !token.trim().is_empty() => token,
        _ => bail!("TICKTASK_TOKEN is not set"),
    };

    info!(
        "Polling {} every {:?} (badges every {:?})",
        settings.api_base_url,
        settings.message_poll_interval(),
        settings.conversation_poll_interval()
    );

    let credentials = Credentials::with_token(token.trim());
    let engine = ChatEngine::with_http(
        &settings,
        credentials.clone(),
        Arc::new(LogSink),
        IntentStore::in_memory(),
    )
    .context("failed to build HTTP backend")?;

    let sync = engine.spawn_sync();
    let mut state = sync.subscribe();

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                info!("Interrupted, shutting down");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                if !credentials.is_logged_in() {
                    sync.shutdown().await;
                    bail!("Access token rejected by the backend");
                }
            }
        }
    }

    sync.shutdown().await;
    Ok(())
}
