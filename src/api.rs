//! Chat service abstraction
//!
//! The sync engine only talks to the chat service through [`ChatApi`].
//! [`XrpcChatApi`] is the production HTTP implementation; tests use the mock
//! in `crate::testing`.

mod error;
mod types;
mod xrpc;

pub use error::{ApiError, ApiErrorKind};
pub use types::*;
pub use xrpc::XrpcChatApi;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Calls the sync engine makes against the chat service
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Fetch log entries after `cursor` (or the latest cursor when `None`)
    async fn get_log(&self, cursor: Option<&str>) -> Result<LogPage, ApiError>;

    async fn get_conversation(&self, convo_id: &str) -> Result<ConvoView, ApiError>;

    /// Fetch a page of messages older than `cursor`, newest first
    async fn get_history(
        &self,
        convo_id: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<HistoryPage, ApiError>;

    async fn send_message(
        &self,
        convo_id: &str,
        message: &MessageInput,
    ) -> Result<MessageView, ApiError>;

    async fn delete_message(&self, convo_id: &str, message_id: &str) -> Result<(), ApiError>;

    async fn add_reaction(
        &self,
        convo_id: &str,
        message_id: &str,
        value: &str,
    ) -> Result<(), ApiError>;

    async fn remove_reaction(
        &self,
        convo_id: &str,
        message_id: &str,
        value: &str,
    ) -> Result<(), ApiError>;

    async fn mark_read(&self, convo_id: &str) -> Result<(), ApiError>;

    async fn accept_convo(&self, convo_id: &str) -> Result<(), ApiError>;
}

/// Logging wrapper for chat API implementations
pub struct LoggingChatApi {
    inner: Arc<dyn ChatApi>,
}

impl LoggingChatApi {
    pub fn new(inner: Arc<dyn ChatApi>) -> Self {
        Self { inner }
    }

    fn record<T>(call: &'static str, start: Instant, result: &Result<T, ApiError>) {
        let duration = start.elapsed();
        match result {
            Ok(_) => {
                tracing::debug!(
                    call,
                    duration_ms = %duration.as_millis(),
                    "Chat API call completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    call,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.is_retryable(),
                    "Chat API call failed"
                );
            }
        }
    }
}

#[async_trait]
impl ChatApi for LoggingChatApi {
    async fn get_log(&self, cursor: Option<&str>) -> Result<LogPage, ApiError> {
        let start = Instant::now();
        let result = self.inner.get_log(cursor).await;
        Self::record("get_log", start, &result);
        result
    }

    async fn get_conversation(&self, convo_id: &str) -> Result<ConvoView, ApiError> {
        let start = Instant::now();
        let result = self.inner.get_conversation(convo_id).await;
        Self::record("get_conversation", start, &result);
        result
    }

    async fn get_history(
        &self,
        convo_id: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<HistoryPage, ApiError> {
        let start = Instant::now();
        let result = self.inner.get_history(convo_id, cursor, limit).await;
        Self::record("get_history", start, &result);
        result
    }

    async fn send_message(
        &self,
        convo_id: &str,
        message: &MessageInput,
    ) -> Result<MessageView, ApiError> {
        let start = Instant::now();
        let result = self.inner.send_message(convo_id, message).await;
        Self::record("send_message", start, &result);
        result
    }

    async fn delete_message(&self, convo_id: &str, message_id: &str) -> Result<(), ApiError> {
        let start = Instant::now();
        let result = self.inner.delete_message(convo_id, message_id).await;
        Self::record("delete_message", start, &result);
        result
    }

    async fn add_reaction(
        &self,
        convo_id: &str,
        message_id: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        let start = Instant::now();
        let result = self.inner.add_reaction(convo_id, message_id, value).await;
        Self::record("add_reaction", start, &result);
        result
    }

    async fn remove_reaction(
        &self,
        convo_id: &str,
        message_id: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        let start = Instant::now();
        let result = self.inner.remove_reaction(convo_id, message_id, value).await;
        Self::record("remove_reaction", start, &result);
        result
    }

    async fn mark_read(&self, convo_id: &str) -> Result<(), ApiError> {
        let start = Instant::now();
        let result = self.inner.mark_read(convo_id).await;
        Self::record("mark_read", start, &result);
        result
    }

    async fn accept_convo(&self, convo_id: &str) -> Result<(), ApiError> {
        let start = Instant::now();
        let result = self.inner.accept_convo(convo_id).await;
        Self::record("accept_convo", start, &result);
        result
    }
}
