//! OpenAI-compatible chat-completion wire format and the reqwest transport.
//!
//! Deepseek, Qwen (DashScope compatible mode) and Hunyuan all accept the
//! same request body and stream the same delta frames, so one client serves
//! every provider.

use crate::error::ChatError;
use crate::transport::{ChatRequest, ChatTransport, TransportResponse};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::agent_api::ChatMessage;
use std::sync::LazyLock;
use std::time::Duration;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

impl ChatCompletionRequest {
    pub fn streaming(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
        }
    }
}

// ── Streaming response types ─────────────────────────────────────────

/// One decoded `data:` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamDelta {
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamFrame {
    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// The delta of the first choice; other choices are never requested.
    pub fn delta(&self) -> Option<&StreamDelta> {
        self.choices.first().map(|c| &c.delta)
    }

    /// Why the first choice stopped, on the frame that ends it.
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first()?.finish_reason.as_deref()
    }
}

/// Payload some providers send as their last line.
pub const DONE_SENTINEL: &str = "[DONE]";

// ── Client ───────────────────────────────────────────────────────────

pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: SHARED_HTTP.clone(),
        }
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse, ChatError> {
        tracing::debug!(
            endpoint = %request.endpoint,
            model = %request.body.model,
            messages = request.body.messages.len(),
            "posting chat completion"
        );
        let resp = self
            .http
            .post(&request.endpoint)
            .header("Authorization", format!("Bearer {}", request.api_key.as_str()))
            .header("Content-Type", "application/json")
            .json(&request.body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| ChatError::Transport(format!("stream read error: {}", e)))
            })
            .boxed();
        Ok(TransportResponse { status, body })
    }
}
