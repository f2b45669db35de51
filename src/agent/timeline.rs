//! Raw message store for one conversation
//!
//! Holds confirmed messages, tombstones and pending sends in display order
//! (oldest first, pending sends last), plus history progress and the inline
//! error flags. Log entries are authoritative: a confirmed view always
//! replaces whatever local optimistic state exists for the same message.

use super::state::ConvoOpError;
use crate::api::{
    DeletedMessageView, HistoryPage, LogEntry, MessageInput, MessageRecord, MessageSender,
    MessageView, ReactionView,
};
use crate::bus::BusError;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// A locally created message the server has not confirmed through the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// Client-generated idempotency key; also the item key
    pub key: String,
    pub message: MessageInput,
    pub sender: MessageSender,
    pub sent_at: DateTime<Utc>,
    pub failed: bool,
    /// Server id returned by the send call, used when the log entry does not
    /// echo the idempotency key
    pub confirmed_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEntry {
    Message(MessageView),
    Deleted(DeletedMessageView),
    Pending(PendingMessage),
}

impl TimelineEntry {
    fn confirmed_id(&self) -> Option<&str> {
        match self {
            TimelineEntry::Message(m) => Some(&m.id),
            TimelineEntry::Deleted(m) => Some(&m.id),
            TimelineEntry::Pending(_) => None,
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self, TimelineEntry::Pending(_))
    }
}

#[derive(Debug, Default)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    history_cursor: Option<String>,
    has_fetched_all_history: bool,
    is_fetching_history: bool,
    history_error: Option<String>,
    firehose_error: Option<BusError>,
}

impl Timeline {
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn has_fetched_all_history(&self) -> bool {
        self.has_fetched_all_history
    }

    pub fn is_fetching_history(&self) -> bool {
        self.is_fetching_history
    }

    pub fn history_error(&self) -> Option<&str> {
        self.history_error.as_deref()
    }

    pub fn firehose_error(&self) -> Option<&BusError> {
        self.firehose_error.as_ref()
    }

    /// Forget confirmed state for a fresh load. Pending sends are kept so a
    /// reload never loses unsent text, and a bus error stays until the bus
    /// reconnects.
    pub fn reset(&mut self) {
        self.entries.retain(TimelineEntry::is_pending);
        self.history_cursor = None;
        self.has_fetched_all_history = false;
        self.is_fetching_history = false;
        self.history_error = None;
    }

    // ========================================================================
    // Log application
    // ========================================================================

    /// Apply one message-level log entry. Returns whether anything changed;
    /// conversation-level entries are ignored here.
    pub fn apply_log(&mut self, entry: LogEntry) -> bool {
        match entry {
            LogEntry::CreateMessage(log) => match log.message {
                MessageRecord::Message(message) => self.upsert_message(message),
                MessageRecord::Deleted(deleted) => self.apply_delete(deleted),
            },
            LogEntry::DeleteMessage(log) => match log.message {
                MessageRecord::Message(message) => {
                    self.apply_delete(DeletedMessageView::from(&message));
                }
                MessageRecord::Deleted(deleted) => self.apply_delete(deleted),
            },
            // The log carries the message as it is after the change
            LogEntry::AddReaction(log) | LogEntry::RemoveReaction(log) => {
                self.upsert_message(log.message);
            }
            _ => return false,
        }
        true
    }

    fn upsert_message(&mut self, message: MessageView) {
        if let Some(index) = self.confirmed_position(&message.id) {
            // A tombstone wins over any late view of the same message
            if let TimelineEntry::Message(existing) = &mut self.entries[index] {
                *existing = message;
            }
            return;
        }

        if let Some(index) = self.pending_position_for(&message) {
            tracing::debug!(message_id = %message.id, "Confirmed pending message");
            self.entries[index] = TimelineEntry::Message(message);
            return;
        }

        self.insert_confirmed(TimelineEntry::Message(message));
    }

    fn apply_delete(&mut self, deleted: DeletedMessageView) {
        let index = self.confirmed_position(&deleted.id).or_else(|| {
            self.entries.iter().position(|entry| {
                matches!(entry, TimelineEntry::Pending(p) if p.confirmed_id.as_deref() == Some(deleted.id.as_str()))
            })
        });

        match index {
            Some(index) => self.entries[index] = TimelineEntry::Deleted(deleted),
            None => self.insert_confirmed(TimelineEntry::Deleted(deleted)),
        }
    }

    fn confirmed_position(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.confirmed_id() == Some(id))
    }

    fn pending_position_for(&self, message: &MessageView) -> Option<usize> {
        self.entries.iter().position(|entry| match entry {
            TimelineEntry::Pending(p) => {
                message.idempotency_key.as_deref() == Some(p.key.as_str())
                    || p.confirmed_id.as_deref() == Some(message.id.as_str())
            }
            _ => false,
        })
    }

    fn pending_position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| matches!(entry, TimelineEntry::Pending(p) if p.key == key))
    }

    /// New confirmed entries go after every confirmed entry but before the
    /// pending sends
    fn insert_confirmed(&mut self, entry: TimelineEntry) {
        let index = self
            .entries
            .iter()
            .position(TimelineEntry::is_pending)
            .unwrap_or(self.entries.len());
        self.entries.insert(index, entry);
    }

    // ========================================================================
    // History
    // ========================================================================

    pub fn can_fetch_history(&self) -> bool {
        !self.is_fetching_history && !self.has_fetched_all_history
    }

    /// Mark a history fetch as started and return the cursor to fetch from
    pub fn begin_history_fetch(&mut self) -> Option<String> {
        self.is_fetching_history = true;
        self.history_error = None;
        self.history_cursor.clone()
    }

    /// Prepend a page of older messages. Pages arrive newest first.
    pub fn merge_history(&mut self, page: HistoryPage) {
        let mut seen: HashSet<String> = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                TimelineEntry::Pending(p) => p.confirmed_id.clone(),
                other => other.confirmed_id().map(str::to_string),
            })
            .collect();

        let mut older: Vec<TimelineEntry> = page
            .messages
            .into_iter()
            .rev()
            .filter(|record| seen.insert(record.id().to_string()))
            .map(|record| match record {
                MessageRecord::Message(m) => TimelineEntry::Message(m),
                MessageRecord::Deleted(d) => TimelineEntry::Deleted(d),
            })
            .collect();

        tracing::debug!(
            added = older.len(),
            has_more = page.cursor.is_some(),
            "Merged history page"
        );

        older.append(&mut self.entries);
        self.entries = older;
        self.has_fetched_all_history = page.cursor.is_none();
        self.history_cursor = page.cursor;
        self.is_fetching_history = false;
        self.history_error = None;
    }

    pub fn fail_history_fetch(&mut self, message: impl Into<String>) {
        self.is_fetching_history = false;
        self.history_error = Some(message.into());
    }

    // ========================================================================
    // Pending sends
    // ========================================================================

    /// Append a pending send under `key`. The key is stamped on the outgoing
    /// message as its idempotency key.
    pub fn add_pending(
        &mut self,
        key: impl Into<String>,
        mut message: MessageInput,
        sender: MessageSender,
        sent_at: DateTime<Utc>,
    ) -> MessageInput {
        let key = key.into();
        message.idempotency_key = Some(key.clone());
        self.entries.push(TimelineEntry::Pending(PendingMessage {
            key,
            message: message.clone(),
            sender,
            sent_at,
            failed: false,
            confirmed_id: None,
        }));
        message
    }

    /// Record a successful send. If the log already delivered the message the
    /// placeholder is dropped; otherwise it waits for the log with the id.
    pub fn confirm_send(&mut self, key: &str, sent: &MessageView) {
        let Some(index) = self.pending_position(key) else {
            return;
        };
        if self.confirmed_position(&sent.id).is_some() {
            self.entries.remove(index);
            return;
        }
        if let TimelineEntry::Pending(p) = &mut self.entries[index] {
            p.failed = false;
            p.confirmed_id = Some(sent.id.clone());
        }
    }

    pub fn fail_send(&mut self, key: &str) -> bool {
        match self.pending_position(key).map(|i| &mut self.entries[i]) {
            Some(TimelineEntry::Pending(p)) => {
                p.failed = true;
                true
            }
            _ => false,
        }
    }

    /// Clear the failed flag of a failed send and return the identical
    /// payload to re-issue
    pub fn retry_send(&mut self, key: &str) -> Option<MessageInput> {
        match self.pending_position(key).map(|i| &mut self.entries[i]) {
            Some(TimelineEntry::Pending(p)) if p.failed => {
                p.failed = false;
                Some(p.message.clone())
            }
            _ => None,
        }
    }

    // ========================================================================
    // Optimistic edits
    // ========================================================================

    fn message_mut(&mut self, message_id: &str) -> Result<&mut MessageView, ConvoOpError> {
        match self
            .confirmed_position(message_id)
            .map(|i| &mut self.entries[i])
        {
            Some(TimelineEntry::Message(m)) => Ok(m),
            _ => Err(ConvoOpError::MessageNotFound(message_id.to_string())),
        }
    }

    /// Add a reaction locally. `Ok(false)` means it was already there.
    pub fn add_reaction(
        &mut self,
        message_id: &str,
        reaction: ReactionView,
    ) -> Result<bool, ConvoOpError> {
        let message = self.message_mut(message_id)?;
        if message.has_reaction(&reaction.value, &reaction.sender.did) {
            return Ok(false);
        }
        message.reactions.push(reaction);
        Ok(true)
    }

    /// Remove a reaction locally, returning it for rollback
    pub fn remove_reaction(
        &mut self,
        message_id: &str,
        value: &str,
        sender_did: &str,
    ) -> Result<Option<ReactionView>, ConvoOpError> {
        let message = self.message_mut(message_id)?;
        let index = message
            .reactions
            .iter()
            .position(|r| r.value == value && r.sender.did == sender_did);
        Ok(index.map(|i| message.reactions.remove(i)))
    }

    /// Replace a message with a tombstone, returning the original for
    /// rollback
    pub fn delete_local(&mut self, message_id: &str) -> Result<MessageView, ConvoOpError> {
        let index = self
            .confirmed_position(message_id)
            .ok_or_else(|| ConvoOpError::MessageNotFound(message_id.to_string()))?;
        let TimelineEntry::Message(original) = &self.entries[index] else {
            return Err(ConvoOpError::MessageNotFound(message_id.to_string()));
        };
        let original = original.clone();
        self.entries[index] = TimelineEntry::Deleted(DeletedMessageView::from(&original));
        Ok(original)
    }

    /// Undo [`Timeline::delete_local`] unless the log has since confirmed
    /// something else for that message
    pub fn restore_deleted(&mut self, original: MessageView) {
        if let Some(index) = self.confirmed_position(&original.id) {
            if let TimelineEntry::Deleted(deleted) = &self.entries[index] {
                if deleted.rev == original.rev {
                    self.entries[index] = TimelineEntry::Message(original);
                }
            }
        }
    }

    // ========================================================================
    // Inline errors
    // ========================================================================

    pub fn set_firehose_error(&mut self, error: BusError) {
        self.firehose_error = Some(error);
    }

    /// Returns whether an error was cleared
    pub fn clear_firehose_error(&mut self) -> bool {
        self.firehose_error.take().is_some()
    }
}
