//! Conversation agent state
//!
//! [`AgentStatus`] is the data-free lifecycle the pure transition function
//! works on. [`ConvoState`] is what callers see: the active variants carry an
//! [`ActiveConvo`], and only that type exposes conversation operations, so a
//! caller has to match on the state before it can send or react.

use super::executor::AgentMessage;
use super::items::ConvoItem;
use crate::api::{ApiError, ConvoView, MessageInput};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Lifecycle of one conversation agent
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AgentStatus {
    #[default]
    Uninitialized,
    /// Fetching conversation metadata and the latest page of messages
    Initializing,
    Ready,
    Backgrounded,
    Suspended,
    /// Viewable, but messaging has been switched off for this conversation
    Disabled,
    Error(ConvoFatalError),
}

impl AgentStatus {
    pub fn name(&self) -> &'static str {
        match self {
            AgentStatus::Uninitialized => "uninitialized",
            AgentStatus::Initializing => "initializing",
            AgentStatus::Ready => "ready",
            AgentStatus::Backgrounded => "backgrounded",
            AgentStatus::Suspended => "suspended",
            AgentStatus::Disabled => "disabled",
            AgentStatus::Error(_) => "error",
        }
    }

    /// States that carry conversation data and operations
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AgentStatus::Ready
                | AgentStatus::Backgrounded
                | AgentStatus::Suspended
                | AgentStatus::Disabled
        )
    }
}

// ============================================================================
// Errors and retry descriptors
// ============================================================================

/// How to recover from an agent-level failure. Hand it to `ConvoAgent::retry`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvoRetry {
    /// Re-run the initial metadata fetch
    Init,
    /// Fetch the history page that failed
    History,
    /// Ask the event bus to resume polling
    Firehose,
    /// Re-issue a failed send with the same idempotency key
    Send { key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvoErrorCode {
    /// Metadata fetch failed after retries; retrying may succeed
    InitFailed,
    /// The conversation cannot be resolved at all; recreate the agent
    Unresolvable,
}

impl fmt::Display for ConvoErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvoErrorCode::InitFailed => write!(f, "init_failed"),
            ConvoErrorCode::Unresolvable => write!(f, "unresolvable"),
        }
    }
}

/// Error that collapses the whole conversation into [`AgentStatus::Error`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvoFatalError {
    pub code: ConvoErrorCode,
    pub message: String,
    pub retry: Option<ConvoRetry>,
}

impl ConvoFatalError {
    /// Classify a failed metadata fetch
    pub fn from_init_failure(error: &ApiError) -> Self {
        if error.is_retryable() {
            Self {
                code: ConvoErrorCode::InitFailed,
                message: error.message.clone(),
                retry: Some(ConvoRetry::Init),
            }
        } else {
            Self {
                code: ConvoErrorCode::Unresolvable,
                message: error.message.clone(),
                retry: None,
            }
        }
    }
}

impl fmt::Display for ConvoFatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Failure of a single conversation operation. Lifecycle state is unaffected.
#[derive(Debug, Clone, Error)]
pub enum ConvoOpError {
    #[error("Conversation is not active")]
    Inactive,
    #[error("Message not found: {0}")]
    MessageNotFound(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Conversation agent is closed")]
    Closed,
}

// ============================================================================
// Caller-facing snapshot
// ============================================================================

/// Snapshot of one conversation as the UI consumes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvoState {
    Uninitialized,
    /// Cached metadata, if the caller supplied any, is available to render
    /// while the first fetch is in flight
    Initializing {
        placeholder: Option<ConvoView>,
    },
    Ready(ActiveConvo),
    Backgrounded(ActiveConvo),
    Suspended(ActiveConvo),
    Disabled(ActiveConvo),
    Error(ConvoFatalError),
}

impl ConvoState {
    pub fn name(&self) -> &'static str {
        match self {
            ConvoState::Uninitialized => "uninitialized",
            ConvoState::Initializing { .. } => "initializing",
            ConvoState::Ready(_) => "ready",
            ConvoState::Backgrounded(_) => "backgrounded",
            ConvoState::Suspended(_) => "suspended",
            ConvoState::Disabled(_) => "disabled",
            ConvoState::Error(_) => "error",
        }
    }

    pub fn as_active(&self) -> Option<&ActiveConvo> {
        match self {
            ConvoState::Ready(active)
            | ConvoState::Backgrounded(active)
            | ConvoState::Suspended(active)
            | ConvoState::Disabled(active) => Some(active),
            _ => None,
        }
    }
}

/// Data and operations of a conversation that has resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConvo {
    pub convo: ConvoView,
    pub items: Vec<ConvoItem>,
    pub is_fetching_history: bool,
    pub has_fetched_all_history: bool,
    ops: ConvoOps,
}

impl ActiveConvo {
    pub(super) fn new(
        convo: ConvoView,
        items: Vec<ConvoItem>,
        is_fetching_history: bool,
        has_fetched_all_history: bool,
        ops: ConvoOps,
    ) -> Self {
        Self {
            convo,
            items,
            is_fetching_history,
            has_fetched_all_history,
            ops,
        }
    }

    /// Queue a message. The pending item shows up in the next published
    /// [`ConvoState`], not in this snapshot; failures show up as a failed
    /// pending item carrying a retry.
    pub fn send_message(&self, message: MessageInput) {
        self.ops.send(AgentMessage::Send(message));
    }

    /// Load the next older page of messages. No-op while a fetch is running
    /// or once everything has been fetched.
    pub fn fetch_message_history(&self) {
        self.ops.send(AgentMessage::FetchHistory);
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<(), ConvoOpError> {
        let message_id = message_id.to_string();
        self.ops
            .request(|reply| AgentMessage::Delete { message_id, reply })
            .await
    }

    pub async fn mark_convo_accepted(&self) -> Result<(), ConvoOpError> {
        self.ops
            .request(|reply| AgentMessage::MarkAccepted { reply })
            .await
    }

    pub async fn mark_read(&self) -> Result<(), ConvoOpError> {
        self.ops.request(|reply| AgentMessage::MarkRead { reply }).await
    }

    pub async fn add_reaction(&self, message_id: &str, value: &str) -> Result<(), ConvoOpError> {
        let message_id = message_id.to_string();
        let value = value.to_string();
        self.ops
            .request(|reply| AgentMessage::AddReaction {
                message_id,
                value,
                reply,
            })
            .await
    }

    pub async fn remove_reaction(&self, message_id: &str, value: &str) -> Result<(), ConvoOpError> {
        let message_id = message_id.to_string();
        let value = value.to_string();
        self.ops
            .request(|reply| AgentMessage::RemoveReaction {
                message_id,
                value,
                reply,
            })
            .await
    }
}

/// Channel back into the agent runtime
#[derive(Debug, Clone)]
pub(super) struct ConvoOps {
    tx: mpsc::UnboundedSender<AgentMessage>,
}

impl ConvoOps {
    pub(super) fn new(tx: mpsc::UnboundedSender<AgentMessage>) -> Self {
        Self { tx }
    }

    fn send(&self, message: AgentMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!("Conversation agent is closed, dropping operation");
        }
    }

    async fn request<F>(&self, build: F) -> Result<(), ConvoOpError>
    where
        F: FnOnce(oneshot::Sender<Result<(), ConvoOpError>>) -> AgentMessage,
    {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| ConvoOpError::Closed)?;
        rx.await.map_err(|_| ConvoOpError::Closed)?
    }
}

impl PartialEq for ConvoOps {
    fn eq(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

impl Eq for ConvoOps {}
