//! Chat log and conversation types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a message or reaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSender {
    pub did: String,
}

impl MessageSender {
    pub fn new(did: impl Into<String>) -> Self {
        Self { did: did.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionView {
    pub value: String,
    pub sender: MessageSender,
    pub created_at: DateTime<Utc>,
}

/// A confirmed message as the service reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub rev: String,
    pub text: String,
    pub sender: MessageSender,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub reactions: Vec<ReactionView>,
    /// Client-generated key echoed back from the originating send
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl MessageView {
    pub fn has_reaction(&self, value: &str, sender_did: &str) -> bool {
        self.reactions
            .iter()
            .any(|r| r.value == value && r.sender.did == sender_did)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMessageView {
    pub id: String,
    pub rev: String,
    pub sender: MessageSender,
    pub sent_at: DateTime<Utc>,
}

impl From<&MessageView> for DeletedMessageView {
    fn from(message: &MessageView) -> Self {
        Self {
            id: message.id.clone(),
            rev: message.rev.clone(),
            sender: message.sender.clone(),
            sent_at: message.sent_at,
        }
    }
}

/// Either shape a message can take on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum MessageRecord {
    #[serde(rename = "chat.bsky.convo.defs#messageView")]
    Message(MessageView),
    #[serde(rename = "chat.bsky.convo.defs#deletedMessageView")]
    Deleted(DeletedMessageView),
}

impl MessageRecord {
    pub fn id(&self) -> &str {
        match self {
            MessageRecord::Message(m) => &m.id,
            MessageRecord::Deleted(m) => &m.id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvoStatus {
    Request,
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvoMember {
    pub did: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Conversation metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvoView {
    pub id: String,
    pub rev: String,
    #[serde(default)]
    pub members: Vec<ConvoMember>,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub unread_count: u64,
    #[serde(default)]
    pub status: Option<ConvoStatus>,
    /// Messaging has been switched off for this conversation by policy
    #[serde(default)]
    pub messaging_disabled: bool,
}

/// Outgoing message payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInput {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl MessageInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            idempotency_key: None,
        }
    }
}

// ============================================================================
// Log entries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvoLog {
    #[serde(default)]
    pub rev: Option<String>,
    pub convo_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageLog {
    #[serde(default)]
    pub rev: Option<String>,
    pub convo_id: String,
    pub message: MessageRecord,
}

/// Reaction change; `message` is the message view after the change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionLog {
    #[serde(default)]
    pub rev: Option<String>,
    pub convo_id: String,
    pub message: MessageView,
    pub reaction: ReactionView,
}

/// One entry of the per-account append-only log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum LogEntry {
    #[serde(rename = "chat.bsky.convo.defs#logBeginConvo")]
    BeginConvo(ConvoLog),
    #[serde(rename = "chat.bsky.convo.defs#logLeaveConvo")]
    LeaveConvo(ConvoLog),
    #[serde(rename = "chat.bsky.convo.defs#logAcceptConvo")]
    AcceptConvo(ConvoLog),
    #[serde(rename = "chat.bsky.convo.defs#logMuteConvo")]
    MuteConvo(ConvoLog),
    #[serde(rename = "chat.bsky.convo.defs#logUnmuteConvo")]
    UnmuteConvo(ConvoLog),
    #[serde(rename = "chat.bsky.convo.defs#logCreateMessage")]
    CreateMessage(MessageLog),
    #[serde(rename = "chat.bsky.convo.defs#logDeleteMessage")]
    DeleteMessage(MessageLog),
    #[serde(rename = "chat.bsky.convo.defs#logReadMessage")]
    ReadMessage(MessageLog),
    #[serde(rename = "chat.bsky.convo.defs#logAddReaction")]
    AddReaction(ReactionLog),
    #[serde(rename = "chat.bsky.convo.defs#logRemoveReaction")]
    RemoveReaction(ReactionLog),
    /// Entry types this client does not understand
    #[serde(other)]
    Unknown,
}

impl LogEntry {
    /// Revision usable for cursor purposes (present and non-empty)
    pub fn rev(&self) -> Option<&str> {
        let rev = match self {
            LogEntry::BeginConvo(l)
            | LogEntry::LeaveConvo(l)
            | LogEntry::AcceptConvo(l)
            | LogEntry::MuteConvo(l)
            | LogEntry::UnmuteConvo(l) => l.rev.as_deref(),
            LogEntry::CreateMessage(l) | LogEntry::DeleteMessage(l) | LogEntry::ReadMessage(l) => {
                l.rev.as_deref()
            }
            LogEntry::AddReaction(l) | LogEntry::RemoveReaction(l) => l.rev.as_deref(),
            LogEntry::Unknown => None,
        };
        rev.filter(|r| !r.is_empty())
    }

    pub fn convo_id(&self) -> Option<&str> {
        match self {
            LogEntry::BeginConvo(l)
            | LogEntry::LeaveConvo(l)
            | LogEntry::AcceptConvo(l)
            | LogEntry::MuteConvo(l)
            | LogEntry::UnmuteConvo(l) => Some(&l.convo_id),
            LogEntry::CreateMessage(l) | LogEntry::DeleteMessage(l) | LogEntry::ReadMessage(l) => {
                Some(&l.convo_id)
            }
            LogEntry::AddReaction(l) | LogEntry::RemoveReaction(l) => Some(&l.convo_id),
            LogEntry::Unknown => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LogEntry::BeginConvo(_) => "begin_convo",
            LogEntry::LeaveConvo(_) => "leave_convo",
            LogEntry::AcceptConvo(_) => "accept_convo",
            LogEntry::MuteConvo(_) => "mute_convo",
            LogEntry::UnmuteConvo(_) => "unmute_convo",
            LogEntry::CreateMessage(_) => "create_message",
            LogEntry::DeleteMessage(_) => "delete_message",
            LogEntry::ReadMessage(_) => "read_message",
            LogEntry::AddReaction(_) => "add_reaction",
            LogEntry::RemoveReaction(_) => "remove_reaction",
            LogEntry::Unknown => "unknown",
        }
    }
}

/// One page of the account log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPage {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// One page of conversation history, newest message first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}
