//! The seam between the chat session and the network.

use crate::error::ChatError;
use crate::openai::ChatCompletionRequest;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::fmt;
use zeroize::Zeroizing;

/// Raw body chunks in arrival order.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ChatError>>;

/// One chat-completion call: where to send it, the bearer key and the body.
pub struct ChatRequest {
    pub endpoint: String,
    pub api_key: Zeroizing<String>,
    pub body: ChatCompletionRequest,
}

impl fmt::Debug for ChatRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatRequest")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("body", &self.body)
            .finish()
    }
}

/// Status plus the still-unread body.
pub struct TransportResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body as text. Read errors end the drain early; whatever
    /// arrived so far is returned.
    pub async fn into_text(self) -> String {
        let mut body = self.body;
        let mut bytes = Vec::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => bytes.extend_from_slice(&chunk),
                Err(e) => {
                    tracing::debug!(error = %e, "error body read cut short");
                    break;
                }
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the request. `Err` only when no response arrived at all; any
    /// HTTP status, success or not, comes back as a `TransportResponse`.
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse, ChatError>;
}
