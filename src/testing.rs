//! Mock chat service for testing
//!
//! Responses are queued per call; when a queue is empty the mock falls back
//! to a harmless default so timer-driven tests can run indefinitely.

#![allow(clippy::missing_panics_doc)]

use crate::api::{
    ApiError, ChatApi, ConvoView, DeletedMessageView, HistoryPage, LogPage, MessageInput,
    MessageSender, MessageView, ReactionView,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn message_view(id: &str, rev: &str, text: &str) -> MessageView {
    MessageView {
        id: id.to_string(),
        rev: rev.to_string(),
        text: text.to_string(),
        sender: MessageSender::new("did:plc:bob"),
        sent_at: fixed_time(),
        reactions: vec![],
        idempotency_key: None,
    }
}

pub fn deleted_view(id: &str, rev: &str) -> DeletedMessageView {
    DeletedMessageView {
        id: id.to_string(),
        rev: rev.to_string(),
        sender: MessageSender::new("did:plc:bob"),
        sent_at: fixed_time(),
    }
}

pub fn reaction(value: &str, sender_did: &str) -> ReactionView {
    ReactionView {
        value: value.to_string(),
        sender: MessageSender::new(sender_did),
        created_at: fixed_time(),
    }
}

pub fn convo_view(id: &str) -> ConvoView {
    ConvoView {
        id: id.to_string(),
        rev: "000000".to_string(),
        members: vec![],
        muted: false,
        unread_count: 0,
        status: None,
        messaging_disabled: false,
    }
}

// ============================================================================
// Mock Chat API
// ============================================================================

/// Calls made against the mock, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    GetLog { cursor: Option<String> },
    GetConversation { convo_id: String },
    GetHistory { convo_id: String, cursor: Option<String>, limit: u32 },
    SendMessage { convo_id: String, message: MessageInput },
    DeleteMessage { convo_id: String, message_id: String },
    AddReaction { convo_id: String, message_id: String, value: String },
    RemoveReaction { convo_id: String, message_id: String, value: String },
    MarkRead { convo_id: String },
    AcceptConvo { convo_id: String },
}

impl MockCall {
    pub fn name(&self) -> &'static str {
        match self {
            MockCall::GetLog { .. } => "get_log",
            MockCall::GetConversation { .. } => "get_conversation",
            MockCall::GetHistory { .. } => "get_history",
            MockCall::SendMessage { .. } => "send_message",
            MockCall::DeleteMessage { .. } => "delete_message",
            MockCall::AddReaction { .. } => "add_reaction",
            MockCall::RemoveReaction { .. } => "remove_reaction",
            MockCall::MarkRead { .. } => "mark_read",
            MockCall::AcceptConvo { .. } => "accept_convo",
        }
    }
}

#[derive(Default)]
pub struct MockChatApi {
    logs: Mutex<VecDeque<Result<LogPage, ApiError>>>,
    convos: Mutex<VecDeque<Result<ConvoView, ApiError>>>,
    default_convo: Mutex<Option<ConvoView>>,
    histories: Mutex<VecDeque<Result<HistoryPage, ApiError>>>,
    sends: Mutex<VecDeque<Result<MessageView, ApiError>>>,
    mutations: Mutex<VecDeque<Result<(), ApiError>>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    sent_count: Mutex<u32>,
    /// Record of all calls made
    pub calls: Mutex<Vec<MockCall>>,
}

impl MockChatApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that resolves `convo_id` to a plain conversation
    pub fn with_convo(convo_id: &str) -> Self {
        let api = Self::new();
        api.set_convo(convo_view(convo_id));
        api
    }

    pub fn queue_log(&self, page: Result<LogPage, ApiError>) {
        self.logs.lock().unwrap().push_back(page);
    }

    pub fn queue_convo(&self, convo: Result<ConvoView, ApiError>) {
        self.convos.lock().unwrap().push_back(convo);
    }

    /// Conversation returned whenever no response is queued
    pub fn set_convo(&self, convo: ConvoView) {
        *self.default_convo.lock().unwrap() = Some(convo);
    }

    pub fn queue_history(&self, page: Result<HistoryPage, ApiError>) {
        self.histories.lock().unwrap().push_back(page);
    }

    pub fn queue_send(&self, result: Result<MessageView, ApiError>) {
        self.sends.lock().unwrap().push_back(result);
    }

    /// Result for the next delete, reaction, read or accept call
    pub fn queue_mutation(&self, result: Result<(), ApiError>) {
        self.mutations.lock().unwrap().push_back(result);
    }

    /// Delay every call of `call` (a [`MockCall::name`]) by `delay`
    pub fn set_delay(&self, call: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(call, delay);
    }

    pub fn recorded_calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.name() == name)
            .count()
    }

    pub fn recorded_log_cursors(&self) -> Vec<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                MockCall::GetLog { cursor } => Some(cursor.clone()),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: MockCall) {
        let delay = self.delays.lock().unwrap().get(call.name()).copied();
        self.calls.lock().unwrap().push(call);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn next_mutation(&self) -> Result<(), ApiError> {
        self.mutations.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn get_log(&self, cursor: Option<&str>) -> Result<LogPage, ApiError> {
        self.record(MockCall::GetLog {
            cursor: cursor.map(str::to_string),
        })
        .await;
        self.logs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(LogPage::default()))
    }

    async fn get_conversation(&self, convo_id: &str) -> Result<ConvoView, ApiError> {
        self.record(MockCall::GetConversation {
            convo_id: convo_id.to_string(),
        })
        .await;
        if let Some(result) = self.convos.lock().unwrap().pop_front() {
            return result;
        }
        self.default_convo
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ApiError::not_found(format!("No mock convo for {convo_id}")))
    }

    async fn get_history(
        &self,
        convo_id: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<HistoryPage, ApiError> {
        self.record(MockCall::GetHistory {
            convo_id: convo_id.to_string(),
            cursor: cursor.map(str::to_string),
            limit,
        })
        .await;
        self.histories
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(HistoryPage::default()))
    }

    async fn send_message(
        &self,
        convo_id: &str,
        message: &MessageInput,
    ) -> Result<MessageView, ApiError> {
        self.record(MockCall::SendMessage {
            convo_id: convo_id.to_string(),
            message: message.clone(),
        })
        .await;
        if let Some(result) = self.sends.lock().unwrap().pop_front() {
            return result;
        }
        let mut count = self.sent_count.lock().unwrap();
        *count += 1;
        let mut view = message_view(&format!("sent-{count}"), "", &message.text);
        view.sender = MessageSender::new("did:plc:alice");
        view.idempotency_key = message.idempotency_key.clone();
        Ok(view)
    }

    async fn delete_message(&self, convo_id: &str, message_id: &str) -> Result<(), ApiError> {
        self.record(MockCall::DeleteMessage {
            convo_id: convo_id.to_string(),
            message_id: message_id.to_string(),
        })
        .await;
        self.next_mutation()
    }

    async fn add_reaction(
        &self,
        convo_id: &str,
        message_id: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        self.record(MockCall::AddReaction {
            convo_id: convo_id.to_string(),
            message_id: message_id.to_string(),
            value: value.to_string(),
        })
        .await;
        self.next_mutation()
    }

    async fn remove_reaction(
        &self,
        convo_id: &str,
        message_id: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        self.record(MockCall::RemoveReaction {
            convo_id: convo_id.to_string(),
            message_id: message_id.to_string(),
            value: value.to_string(),
        })
        .await;
        self.next_mutation()
    }

    async fn mark_read(&self, convo_id: &str) -> Result<(), ApiError> {
        self.record(MockCall::MarkRead {
            convo_id: convo_id.to_string(),
        })
        .await;
        self.next_mutation()
    }

    async fn accept_convo(&self, convo_id: &str) -> Result<(), ApiError> {
        self.record(MockCall::AcceptConvo {
            convo_id: convo_id.to_string(),
        })
        .await;
        self.next_mutation()
    }
}
