//! HTTP implementation of [`ChatApi`] over the `chat.bsky.convo.*` XRPC methods

use super::{
    ApiError, ChatApi, ConvoView, HistoryPage, LogPage, MessageInput, MessageView,
};
use crate::config::ClientConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_SERVICE_URL: &str = "https://api.bsky.chat";

pub struct XrpcChatApi {
    client: Client,
    base_url: String,
    access_token: Option<String>,
    proxy: Option<String>,
}

impl XrpcChatApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::unknown(format!("Failed to create HTTP client: {e}")))?;

        let service = config
            .service_url
            .as_deref()
            .unwrap_or(DEFAULT_SERVICE_URL)
            .trim_end_matches('/');

        Ok(Self {
            client,
            base_url: format!("{service}/xrpc"),
            access_token: config.access_token.clone(),
            proxy: config.proxy.clone(),
        })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        match &self.proxy {
            Some(proxy) => builder.header("atproto-proxy", proxy),
            None => builder,
        }
    }

    async fn query<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let url = format!("{}/{method}", self.base_url);
        let request = self.authorize(self.client.get(url).query(params));
        let body = Self::send(request).await?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::unknown(format!("Failed to parse {method} response: {e}")))
    }

    async fn procedure<B: Serialize + Sync>(&self, method: &str, input: &B) -> Result<(), ApiError> {
        let url = format!("{}/{method}", self.base_url);
        let request = self.authorize(self.client.post(url).json(input));
        Self::send(request).await.map(|_| ())
    }

    async fn procedure_with_output<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: &str,
        input: &B,
    ) -> Result<T, ApiError> {
        let url = format!("{}/{method}", self.base_url);
        let request = self.authorize(self.client.post(url).json(input));
        let body = Self::send(request).await?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::unknown(format!("Failed to parse {method} response: {e}")))
    }

    async fn send(request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                ApiError::network(format!("Connection failed: {e}"))
            } else {
                ApiError::unknown(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }
        Ok(body)
    }
}

fn classify_error(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<XrpcErrorBody>(body)
        .ok()
        .and_then(|e| e.message.or(e.error))
        .unwrap_or_else(|| body.to_string());

    match status.as_u16() {
        401 | 403 => ApiError::auth(format!("Authentication failed: {message}")),
        404 => ApiError::not_found(message),
        429 => ApiError::rate_limit(format!("Rate limited: {message}")),
        400 => ApiError::invalid_request(format!("Invalid request: {message}")),
        500..=599 => ApiError::server_error(format!("Server error: {message}")),
        _ => ApiError::unknown(format!("HTTP {status}: {message}")),
    }
}

#[async_trait]
impl ChatApi for XrpcChatApi {
    async fn get_log(&self, cursor: Option<&str>) -> Result<LogPage, ApiError> {
        let params: Vec<(&str, &str)> = cursor.map(|c| ("cursor", c)).into_iter().collect();
        self.query("chat.bsky.convo.getLog", &params).await
    }

    async fn get_conversation(&self, convo_id: &str) -> Result<ConvoView, ApiError> {
        let output: ConvoOutput = self
            .query("chat.bsky.convo.getConvo", &[("convoId", convo_id)])
            .await?;
        Ok(output.convo)
    }

    async fn get_history(
        &self,
        convo_id: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<HistoryPage, ApiError> {
        let limit = limit.to_string();
        let mut params = vec![("convoId", convo_id), ("limit", limit.as_str())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        self.query("chat.bsky.convo.getMessages", &params).await
    }

    async fn send_message(
        &self,
        convo_id: &str,
        message: &MessageInput,
    ) -> Result<MessageView, ApiError> {
        self.procedure_with_output(
            "chat.bsky.convo.sendMessage",
            &SendMessageInput { convo_id, message },
        )
        .await
    }

    async fn delete_message(&self, convo_id: &str, message_id: &str) -> Result<(), ApiError> {
        self.procedure(
            "chat.bsky.convo.deleteMessageForSelf",
            &MessageRef {
                convo_id,
                message_id,
            },
        )
        .await
    }

    async fn add_reaction(
        &self,
        convo_id: &str,
        message_id: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        self.procedure(
            "chat.bsky.convo.addReaction",
            &ReactionInput {
                convo_id,
                message_id,
                value,
            },
        )
        .await
    }

    async fn remove_reaction(
        &self,
        convo_id: &str,
        message_id: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        self.procedure(
            "chat.bsky.convo.removeReaction",
            &ReactionInput {
                convo_id,
                message_id,
                value,
            },
        )
        .await
    }

    async fn mark_read(&self, convo_id: &str) -> Result<(), ApiError> {
        self.procedure("chat.bsky.convo.updateRead", &ConvoRef { convo_id })
            .await
    }

    async fn accept_convo(&self, convo_id: &str) -> Result<(), ApiError> {
        self.procedure("chat.bsky.convo.acceptConvo", &ConvoRef { convo_id })
            .await
    }
}

// XRPC request/response bodies

#[derive(Debug, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConvoOutput {
    convo: ConvoView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConvoRef<'a> {
    convo_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef<'a> {
    convo_id: &'a str,
    message_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReactionInput<'a> {
    convo_id: &'a str,
    message_id: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageInput<'a> {
    convo_id: &'a str,
    message: &'a MessageInput,
}
