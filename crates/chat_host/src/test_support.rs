//! Headless collaborators for tests: a sink that records every call and a
//! transport that replays scripted responses.

use crate::render::{Channel, KeyPrompt, RenderSink, ScrollRequest};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use providers::{ChatError, ChatRequest, ChatTransport, Provider, TransportResponse};
use shared::agent_api::ChatMessage;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    UserTurn(String),
    AssistantTurn { provider: Provider, model: String },
    Render { channel: Channel, raw: String, html: String },
    Error { raw: String, html: String },
    Scroll(ScrollRequest),
    Loading(bool),
    KeyRequested { provider: Provider, reason: KeyPrompt },
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn scrolls(&self) -> Vec<ScrollRequest> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Scroll(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// (raw, html) of every render on `channel`.
    pub fn renders(&self, channel: Channel) -> Vec<(String, String)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Render {
                    channel: c,
                    raw,
                    html,
                } if *c == channel => Some((raw.clone(), html.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Error { raw, .. } => Some(raw.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn key_requests(&self) -> Vec<(Provider, KeyPrompt)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::KeyRequested { provider, reason } => Some((*provider, *reason)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().push(event);
    }
}

impl RenderSink for RecordingSink {
    fn user_turn(&self, text: &str) {
        self.push(SinkEvent::UserTurn(text.to_string()));
    }

    fn assistant_turn_started(&self, provider: Provider, model: &str) {
        self.push(SinkEvent::AssistantTurn {
            provider,
            model: model.to_string(),
        });
    }

    fn render(&self, channel: Channel, raw: &str, html: &str) {
        self.push(SinkEvent::Render {
            channel,
            raw: raw.to_string(),
            html: html.to_string(),
        });
    }

    fn error(&self, raw: &str, html: &str) {
        self.push(SinkEvent::Error {
            raw: raw.to_string(),
            html: html.to_string(),
        });
    }

    fn scroll_to_bottom(&self, request: ScrollRequest) {
        self.push(SinkEvent::Scroll(request));
    }

    fn loading(&self, active: bool) {
        self.push(SinkEvent::Loading(active));
    }

    fn request_api_key(&self, provider: Provider, reason: KeyPrompt) {
        self.push(SinkEvent::KeyRequested { provider, reason });
    }
}

/// `data:` line carrying a content delta.
pub fn content_frame(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}}]})
    )
}

/// `data:` line carrying a reasoning delta.
pub fn reasoning_frame(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"index": 0, "delta": {"reasoning_content": text, "content": null}}]})
    )
}

pub enum Script {
    /// Respond with `status` and stream `chunks` as the body.
    Respond {
        status: u16,
        chunks: Vec<Result<Vec<u8>, ChatError>>,
    },
    /// Fail before any response arrives.
    Refuse(ChatError),
}

impl Script {
    pub fn ok(chunks: &[&str]) -> Self {
        Script::Respond {
            status: 200,
            chunks: chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect(),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Script::Respond {
            status,
            chunks: vec![Ok(body.as_bytes().to_vec())],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    sent: Mutex<Vec<SentRequest>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse, ChatError> {
        self.sent.lock().push(SentRequest {
            endpoint: request.endpoint.clone(),
            api_key: request.api_key.as_str().to_string(),
            model: request.body.model.clone(),
            messages: request.body.messages.clone(),
        });
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted response for {:?}", request));
        match script {
            Script::Respond { status, chunks } => Ok(TransportResponse {
                status,
                body: futures::stream::iter(chunks).boxed(),
            }),
            Script::Refuse(err) => Err(err),
        }
    }
}
