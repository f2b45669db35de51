//! Item projection
//!
//! Turns a [`Timeline`] into the ordered, render-ready item list. Every
//! message-bearing item learns its neighbouring messages so the UI can group
//! consecutive messages from one sender. Neighbours are copied by value and
//! recomputed on every projection; they are never stored.

use super::state::ConvoRetry;
use super::timeline::{Timeline, TimelineEntry};
use crate::api::{DeletedMessageView, MessageInput, MessageSender, MessageView};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const HISTORY_ERROR_KEY: &str = "history-error";
const FIREHOSE_ERROR_KEY: &str = "firehose-error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvoItemErrorCode {
    /// Loading older messages failed
    HistoryFailed,
    /// The event bus stopped delivering log entries
    FirehoseFailed,
}

/// The adjacent message of an item, as far as grouping needs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacentMessage {
    pub key: String,
    pub sender: MessageSender,
    pub sent_at: DateTime<Utc>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvoItem {
    Message {
        key: String,
        message: MessageView,
        prev: Option<AdjacentMessage>,
        next: Option<AdjacentMessage>,
    },
    PendingMessage {
        key: String,
        message: MessageInput,
        sender: MessageSender,
        sent_at: DateTime<Utc>,
        failed: bool,
        /// Present exactly when the send failed
        retry: Option<ConvoRetry>,
        prev: Option<AdjacentMessage>,
        next: Option<AdjacentMessage>,
    },
    DeletedMessage {
        key: String,
        message: DeletedMessageView,
        prev: Option<AdjacentMessage>,
        next: Option<AdjacentMessage>,
    },
    Error {
        key: String,
        code: ConvoItemErrorCode,
        message: String,
        retry: Option<ConvoRetry>,
    },
}

impl ConvoItem {
    pub fn key(&self) -> &str {
        match self {
            ConvoItem::Message { key, .. }
            | ConvoItem::PendingMessage { key, .. }
            | ConvoItem::DeletedMessage { key, .. }
            | ConvoItem::Error { key, .. } => key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ConvoItem::Message { .. } => "message",
            ConvoItem::PendingMessage { .. } => "pending-message",
            ConvoItem::DeletedMessage { .. } => "deleted-message",
            ConvoItem::Error { .. } => "error",
        }
    }

    pub fn prev(&self) -> Option<&AdjacentMessage> {
        match self {
            ConvoItem::Message { prev, .. }
            | ConvoItem::PendingMessage { prev, .. }
            | ConvoItem::DeletedMessage { prev, .. } => prev.as_ref(),
            ConvoItem::Error { .. } => None,
        }
    }

    pub fn next(&self) -> Option<&AdjacentMessage> {
        match self {
            ConvoItem::Message { next, .. }
            | ConvoItem::PendingMessage { next, .. }
            | ConvoItem::DeletedMessage { next, .. } => next.as_ref(),
            ConvoItem::Error { .. } => None,
        }
    }
}

fn adjacent(entry: &TimelineEntry) -> AdjacentMessage {
    match entry {
        TimelineEntry::Message(m) => AdjacentMessage {
            key: m.id.clone(),
            sender: m.sender.clone(),
            sent_at: m.sent_at,
            deleted: false,
        },
        TimelineEntry::Deleted(d) => AdjacentMessage {
            key: d.id.clone(),
            sender: d.sender.clone(),
            sent_at: d.sent_at,
            deleted: true,
        },
        TimelineEntry::Pending(p) => AdjacentMessage {
            key: p.key.clone(),
            sender: p.sender.clone(),
            sent_at: p.sent_at,
            deleted: false,
        },
    }
}

/// Project the timeline into display order: the history error (if any)
/// first, then every message oldest to newest, then the firehose error
pub fn project(timeline: &Timeline) -> Vec<ConvoItem> {
    let entries = timeline.entries();
    let mut items = Vec::with_capacity(entries.len() + 2);

    if let Some(message) = timeline.history_error() {
        items.push(ConvoItem::Error {
            key: HISTORY_ERROR_KEY.to_string(),
            code: ConvoItemErrorCode::HistoryFailed,
            message: message.to_string(),
            retry: Some(ConvoRetry::History),
        });
    }

    for (index, entry) in entries.iter().enumerate() {
        let prev = index.checked_sub(1).map(|i| adjacent(&entries[i]));
        let next = entries.get(index + 1).map(adjacent);

        items.push(match entry {
            TimelineEntry::Message(m) => ConvoItem::Message {
                key: m.id.clone(),
                message: m.clone(),
                prev,
                next,
            },
            TimelineEntry::Deleted(d) => ConvoItem::DeletedMessage {
                key: d.id.clone(),
                message: d.clone(),
                prev,
                next,
            },
            TimelineEntry::Pending(p) => ConvoItem::PendingMessage {
                key: p.key.clone(),
                message: p.message.clone(),
                sender: p.sender.clone(),
                sent_at: p.sent_at,
                failed: p.failed,
                retry: p.failed.then(|| ConvoRetry::Send { key: p.key.clone() }),
                prev,
                next,
            },
        });
    }

    if let Some(error) = timeline.firehose_error() {
        items.push(ConvoItem::Error {
            key: FIREHOSE_ERROR_KEY.to_string(),
            code: ConvoItemErrorCode::FirehoseFailed,
            message: error.message.clone(),
            retry: Some(ConvoRetry::Firehose),
        });
    }

    items
}
