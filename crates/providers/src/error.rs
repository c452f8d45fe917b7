use crate::router::Provider;
use thiserror::Error;

/// Longest error body (in chars) kept for display.
pub const ERROR_DETAIL_LIMIT: usize = 800;

/// Everything that can end or interrupt a chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// No key stored for the provider the selected model resolves to.
    #[error("no API key set for {provider}")]
    AuthMissing { provider: Provider },

    /// The endpoint answered 401.
    #[error("the {provider} API key was rejected (HTTP 401)")]
    AuthInvalid { provider: Provider },

    /// Any other non-2xx status.
    #[error("HTTP error! status: {status}{}", detail_suffix(.detail))]
    Http { status: u16, detail: String },

    /// Connection failures and errors while reading the body.
    #[error("transport error: {0}")]
    Transport(String),

    /// One `data:` line that did not decode. Never ends a stream.
    #[error("malformed stream frame: {message}")]
    FrameParse { line: String, message: String },

    #[error("an API key cannot be empty")]
    EmptyApiKey,

    #[error("storage error: {0}")]
    Storage(String),
}

fn detail_suffix(detail: &str) -> String {
    if detail.trim().is_empty() {
        String::new()
    } else {
        format!("\n{}", detail)
    }
}

impl ChatError {
    /// Map a non-success status to the matching variant.
    pub fn from_status(provider: Provider, status: u16, body: &str) -> Self {
        if status == 401 {
            return ChatError::AuthInvalid { provider };
        }
        ChatError::Http {
            status,
            detail: body.chars().take(ERROR_DETAIL_LIMIT).collect(),
        }
    }

    pub fn storage(err: anyhow::Error) -> Self {
        ChatError::Storage(format!("{:#}", err))
    }

    /// True when the user can recover by entering a (new) API key.
    pub fn needs_api_key(&self) -> bool {
        matches!(
            self,
            ChatError::AuthMissing { .. } | ChatError::AuthInvalid { .. }
        )
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(err.to_string())
    }
}
