//! convo-sync - follow one conversation from the command line
//!
//! Starts the event bus and a conversation agent, marks the conversation
//! read, and logs every state change until interrupted.

use convo_sync::agent::{ConvoAgent, ConvoAgentParams, ConvoItem, ConvoState};
use convo_sync::api::{ChatApi, LoggingChatApi, XrpcChatApi};
use convo_sync::bus::EventBus;
use convo_sync::config::{ClientConfig, SyncConfig};
use futures::StreamExt;
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convo_sync=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let convo_id = std::env::var("CONVO_ID").map_err(|_| "CONVO_ID must be set")?;
    let sync_config = SyncConfig::from_env();
    let client_config = ClientConfig::from_env();
    let viewer_did = client_config
        .viewer_did
        .clone()
        .ok_or("CHAT_VIEWER_DID must be set")?;

    let xrpc: Arc<dyn ChatApi> = Arc::new(XrpcChatApi::new(&client_config)?);
    let api: Arc<dyn ChatApi> = Arc::new(LoggingChatApi::new(xrpc));

    tracing::info!(
        convo_id = %convo_id,
        poll_ms = %sync_config.default_poll_interval.as_millis(),
        "Starting conversation sync"
    );

    let bus = EventBus::start(Arc::clone(&api), sync_config.clone());
    let agent = ConvoAgent::start(ConvoAgentParams {
        convo_id,
        viewer_did,
        bus: bus.clone(),
        api,
        config: sync_config,
        placeholder: None,
    });
    agent.resume();

    let mut states = WatchStream::new(agent.watch_state());
    let mut marked_read = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
            state = states.next() => {
                let Some(state) = state else { break };
                log_state(&state);

                if let (false, Some(active)) = (marked_read, state.as_active()) {
                    marked_read = true;
                    if let Err(e) = active.mark_read().await {
                        tracing::warn!(error = %e, "Failed to mark conversation read");
                    }
                }
            }
        }
    }

    agent.close();
    bus.shutdown();
    Ok(())
}

fn log_state(state: &ConvoState) {
    let Some(active) = state.as_active() else {
        tracing::info!(state = state.name(), "Conversation state");
        return;
    };

    tracing::info!(
        state = state.name(),
        unread = active.convo.unread_count,
        items = active.items.len(),
        fetching_history = active.is_fetching_history,
        "Conversation state"
    );

    if let Some(item) = active.items.last() {
        match item {
            ConvoItem::Message { message, .. } => {
                tracing::info!(sender = %message.sender.did, text = %message.text, "Latest message");
            }
            ConvoItem::PendingMessage { failed, .. } => {
                tracing::info!(failed, "Latest message is pending");
            }
            ConvoItem::DeletedMessage { key, .. } => {
                tracing::info!(key = %key, "Latest message was deleted");
            }
            ConvoItem::Error { code, message, .. } => {
                tracing::warn!(?code, error = %message, "Conversation error");
            }
        }
    }
}
