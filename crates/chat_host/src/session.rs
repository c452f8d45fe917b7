//! The chat session: one conversation, its preferences and the turn state
//! machine.
//!
//! ```text
//! Idle ──submit──▶ Requesting ──2xx──▶ Streaming ──end of stream──▶ Completed
//!   │                │    │                │
//!   │ no key         │    │ other error    │ read error
//!   ▼                │    ▼                ▼
//! PendingAuth ◀─401──┘  Failed ◀───────────┘
//! ```
//!
//! A turn runs to completion inside `submit`, which holds `&mut self`, so a
//! second message cannot start while one is in flight.

use crate::consumer::{RenderBuffers, StreamConsumer};
use crate::conversation::ConversationLog;
use crate::render::{KeyPrompt, RenderDriver, RenderSink};
use crate::transcript::Transcript;
use providers::{
    ChatError, ChatRequest, ChatTransport, EndpointTable, ModelEndpointBinding, Provider,
};
use providers::openai::ChatCompletionRequest;
use shared::settings::{Preferences, DEFAULT_SYSTEM_PROMPT};
use shared::storage::KeyValueStore;
use std::sync::Arc;
use uuid::Uuid;
use zeroize::Zeroizing;

const REJECTED_KEY_NOTICE: &str = "The API key is invalid, please enter it again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    /// A message is waiting for an API key.
    PendingAuth,
    Requesting,
    Streaming,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing to send (blank message, or a key stored with no message
    /// waiting).
    Ignored,
    /// The reply was streamed to the end and recorded.
    Completed(RenderBuffers),
}

pub struct ChatSession {
    id: Uuid,
    log: ConversationLog,
    pending: Option<String>,
    state: TurnState,
    preferences: Preferences,
    system_prompt: String,
    endpoints: EndpointTable,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn ChatTransport>,
    driver: RenderDriver,
}

impl ChatSession {
    /// Start a session. Preferences are read from `store`.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn ChatTransport>,
        sink: Arc<dyn RenderSink>,
        endpoints: EndpointTable,
    ) -> Self {
        let preferences = Preferences::load(store.as_ref());
        let id = Uuid::new_v4();
        tracing::debug!(session = %id, model = %preferences.selected_model, "session started");
        Self {
            id,
            log: ConversationLog::new(),
            pending: None,
            state: TurnState::Idle,
            preferences,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            endpoints,
            store,
            transport,
            driver: RenderDriver::new(sink),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn pending_message(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn selected_model(&self) -> &str {
        &self.preferences.selected_model
    }

    /// Provider binding for the selected model.
    pub fn binding(&self) -> ModelEndpointBinding {
        self.endpoints.resolve(&self.preferences.selected_model)
    }

    // ── Preferences ──────────────────────────────────────────────────

    pub fn select_model(&mut self, model: &str) -> Result<(), ChatError> {
        let model = model.trim();
        if model.is_empty() {
            return Ok(());
        }
        self.preferences.selected_model = model.to_string();
        self.preferences
            .save(self.store.as_ref())
            .map_err(ChatError::storage)?;
        let binding = self.binding();
        tracing::info!(model, provider = %binding.provider, fallback = binding.fallback, "model selected");
        Ok(())
    }

    /// Flip dark mode, persist it and return the new value.
    pub fn toggle_dark_mode(&mut self) -> Result<bool, ChatError> {
        self.preferences.dark_mode = !self.preferences.dark_mode;
        self.preferences
            .save(self.store.as_ref())
            .map_err(ChatError::storage)?;
        Ok(self.preferences.dark_mode)
    }

    // ── API keys ─────────────────────────────────────────────────────

    pub fn api_key(&self, provider: Provider) -> Option<Zeroizing<String>> {
        self.store
            .get(provider.storage_key())
            .map(|k| Zeroizing::new(k.trim().to_string()))
            .filter(|k| !k.is_empty())
    }

    pub fn set_api_key(&mut self, provider: Provider, key: &str) -> Result<(), ChatError> {
        let key = Zeroizing::new(key.trim().to_string());
        if key.is_empty() {
            return Err(ChatError::EmptyApiKey);
        }
        self.store
            .set(provider.storage_key(), &key)
            .map_err(ChatError::storage)?;
        tracing::info!(%provider, "API key updated");
        Ok(())
    }

    pub fn remove_api_key(&mut self, provider: Provider) -> Result<(), ChatError> {
        self.store
            .remove(provider.storage_key())
            .map_err(ChatError::storage)?;
        tracing::info!(%provider, "API key removed");
        Ok(())
    }

    /// Whether each provider has a key stored.
    pub fn key_status(&self) -> Vec<(Provider, bool)> {
        Provider::ALL
            .into_iter()
            .map(|p| (p, self.api_key(p).is_some()))
            .collect()
    }

    /// Store a key for the selected model's provider and resend the
    /// message that was waiting for it, if any.
    pub async fn submit_api_key(&mut self, key: &str) -> Result<TurnOutcome, ChatError> {
        let provider = self.binding().provider;
        self.provide_api_key(provider, key).await
    }

    /// Store a key for `provider`. When that is the provider the waiting
    /// message needs, the message is resent; otherwise the session stays
    /// as it was.
    pub async fn provide_api_key(
        &mut self,
        provider: Provider,
        key: &str,
    ) -> Result<TurnOutcome, ChatError> {
        self.set_api_key(provider, key)?;
        if provider != self.binding().provider {
            return Ok(TurnOutcome::Ignored);
        }
        if self.state == TurnState::PendingAuth {
            self.state = TurnState::Idle;
        }
        match self.pending.take() {
            Some(message) => self.submit(&message).await,
            None => Ok(TurnOutcome::Ignored),
        }
    }

    // ── Turns ────────────────────────────────────────────────────────

    /// Send `message` and stream the reply.
    ///
    /// Without a stored key the message is kept as pending and
    /// `AuthMissing` returned; a 401 clears the key, keeps the message and
    /// returns `AuthInvalid`. In both cases `submit_api_key` resumes. Other
    /// failures are rendered and returned, and nothing is retried.
    pub async fn submit(&mut self, message: &str) -> Result<TurnOutcome, ChatError> {
        if message.trim().is_empty() {
            return Ok(TurnOutcome::Ignored);
        }

        let binding = self.binding();
        let Some(api_key) = self.api_key(binding.provider) else {
            tracing::info!(provider = %binding.provider, "no API key, holding message");
            self.pending = Some(message.to_string());
            self.state = TurnState::PendingAuth;
            self.driver
                .sink()
                .request_api_key(binding.provider, KeyPrompt::Missing);
            return Err(ChatError::AuthMissing {
                provider: binding.provider,
            });
        };
        self.pending = None;

        let sink = self.driver.sink().clone();
        sink.user_turn(message);
        sink.loading(true);

        let model = self.preferences.selected_model.clone();
        let request = ChatRequest {
            endpoint: binding.endpoint.clone(),
            api_key,
            body: ChatCompletionRequest::streaming(
                model.clone(),
                self.log.request_messages(&self.system_prompt, message),
            ),
        };
        self.driver.begin_turn(binding.provider, &model);

        let result = self.run_turn(binding.provider, &request).await;
        sink.loading(false);

        match result {
            Ok(buffers) => {
                self.log.commit_exchange(message, &buffers.content);
                self.driver.finish();
                self.state = TurnState::Completed;
                tracing::info!(
                    session = %self.id,
                    provider = %binding.provider,
                    turns = self.log.len(),
                    "turn completed"
                );
                Ok(TurnOutcome::Completed(buffers))
            }
            Err(err) => Err(self.fail_turn(&binding, message, err)),
        }
    }

    async fn run_turn(
        &mut self,
        provider: Provider,
        request: &ChatRequest,
    ) -> Result<RenderBuffers, ChatError> {
        self.state = TurnState::Requesting;
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            let status = response.status;
            let body = response.into_text().await;
            return Err(ChatError::from_status(provider, status, &body));
        }
        self.state = TurnState::Streaming;
        StreamConsumer::new(&mut self.driver)
            .consume(response.body)
            .await
    }

    fn fail_turn(
        &mut self,
        binding: &ModelEndpointBinding,
        message: &str,
        err: ChatError,
    ) -> ChatError {
        if let ChatError::AuthInvalid { provider } = err {
            tracing::warn!(%provider, "API key rejected, clearing it");
            if let Err(e) = self.store.remove(binding.storage_key) {
                tracing::warn!(%provider, error = %e, "could not clear rejected key");
            }
            self.pending = Some(message.to_string());
            self.state = TurnState::PendingAuth;
            self.driver.fail(REJECTED_KEY_NOTICE);
            self.driver
                .sink()
                .request_api_key(provider, KeyPrompt::Rejected);
        } else {
            tracing::warn!(session = %self.id, error = %err, "turn failed");
            self.state = TurnState::Failed;
            self.driver.fail(&format!(
                "Something went wrong, please try again later. Error: {}",
                err
            ));
        }
        err
    }

    /// Forget the conversation and any message waiting for a key.
    pub fn reset(&mut self) {
        self.log.clear();
        self.pending = None;
        self.state = TurnState::Idle;
        tracing::debug!(session = %self.id, "session reset");
    }

    /// Transcript of the conversation so far, `None` when there is nothing
    /// to export.
    pub fn transcript(&self) -> Option<Transcript<'_>> {
        if self.log.is_empty() {
            return None;
        }
        Some(Transcript::now(self.log.turns(), self.selected_model()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Channel;
    use crate::test_support::{
        content_frame, reasoning_frame, RecordingSink, Script, ScriptedTransport, SinkEvent,
    };
    use shared::agent_api::{ChatMessage, Role};
    use shared::settings::{DARK_MODE_KEY, SELECTED_MODEL_KEY};
    use shared::storage::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        transport: Arc<ScriptedTransport>,
        sink: Arc<RecordingSink>,
        session: ChatSession,
    }

    fn harness(model: &str, key: Option<&str>, scripts: Vec<Script>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        store.set(SELECTED_MODEL_KEY, model).unwrap();
        if let Some(key) = key {
            let provider = EndpointTable::default().resolve(model).provider;
            store.set(provider.storage_key(), key).unwrap();
        }
        let transport = ScriptedTransport::new(scripts);
        let sink = RecordingSink::new();
        let session = ChatSession::new(
            store.clone(),
            transport.clone(),
            sink.clone(),
            EndpointTable::default(),
        );
        Harness {
            store,
            transport,
            sink,
            session,
        }
    }

    fn frames(parts: &[&str]) -> Script {
        let owned: Vec<String> = parts.iter().map(|p| content_frame(p)).collect();
        let refs: Vec<&str> = owned.iter().map(String::as_str).collect();
        Script::ok(&refs)
    }

    #[tokio::test]
    async fn test_streamed_reply_is_appended_once() {
        let mut h = harness("deepseek-chat", Some("sk-ds"), vec![frames(&["A", "B"])]);
        let outcome = h.session.submit("hello").await.unwrap();

        match outcome {
            TurnOutcome::Completed(buffers) => assert_eq!(buffers.content, "AB"),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(
            h.session.log().turns(),
            &[ChatMessage::user("hello"), ChatMessage::assistant("AB")]
        );
        assert_eq!(h.session.state(), TurnState::Completed);

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].endpoint, "https://api.deepseek.com/chat/completions");
        assert_eq!(sent[0].api_key, "sk-ds");
        assert_eq!(sent[0].model, "deepseek-chat");
        assert_eq!(
            sent[0].messages,
            vec![
                ChatMessage::system(DEFAULT_SYSTEM_PROMPT),
                ChatMessage::user("hello")
            ]
        );

        // Final scroll is immediate and comes last.
        let events = h.sink.events();
        assert!(matches!(
            events.last(),
            Some(SinkEvent::Scroll(s)) if s.smooth
        ));
        assert!(events.contains(&SinkEvent::Loading(true)));
        assert!(events.contains(&SinkEvent::Loading(false)));
    }

    #[tokio::test]
    async fn test_history_alternates_and_is_resent() {
        let n = 3;
        let scripts = (0..n)
            .map(|i| frames(&[&format!("reply {i}")]))
            .collect();
        let mut h = harness("hunyuan-turbo", Some("sk-hy"), scripts);
        for i in 0..n {
            h.session.submit(&format!("question {i}")).await.unwrap();
        }

        let turns = h.session.log().turns();
        assert_eq!(turns.len(), 2 * n);
        for (i, turn) in turns.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(turn.role, expected);
        }
        assert_eq!(h.session.log().count(Role::System), 0);

        let last = h.transport.sent().pop().unwrap();
        assert_eq!(last.messages.len(), 1 + 2 * (n - 1) + 1);
        assert_eq!(last.messages[0].role, Role::System);
        assert_eq!(last.messages[1], ChatMessage::user("question 0"));
        assert_eq!(last.messages.last().unwrap(), &ChatMessage::user("question 2"));
        assert!(last.endpoint.contains("hunyuan"));
    }

    #[tokio::test]
    async fn test_missing_key_holds_message() {
        let mut h = harness("qwen-max", None, vec![frames(&["ok"])]);
        let err = h.session.submit("first question").await.unwrap_err();

        assert_eq!(
            err,
            ChatError::AuthMissing {
                provider: Provider::Qwen
            }
        );
        assert!(err.needs_api_key());
        assert_eq!(h.session.state(), TurnState::PendingAuth);
        assert_eq!(h.session.pending_message(), Some("first question"));
        assert!(h.session.log().is_empty());
        assert!(h.transport.sent().is_empty());
        assert_eq!(
            h.sink.key_requests(),
            vec![(Provider::Qwen, KeyPrompt::Missing)]
        );

        let outcome = h.session.submit_api_key("  sk-qwen  ").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed(_)));
        assert_eq!(h.store.get("apiKey_qwen").as_deref(), Some("sk-qwen"));
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].api_key, "sk-qwen");
        assert_eq!(
            sent[0].messages.last().unwrap(),
            &ChatMessage::user("first question")
        );
        assert_eq!(h.session.pending_message(), None);
        assert_eq!(h.session.log().len(), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_clears_key_and_resubmits() {
        let mut h = harness(
            "qwq-32b",
            Some("sk-stale"),
            vec![Script::status(401, "Incorrect API key")],
        );
        let err = h.session.submit("explain borrowing").await.unwrap_err();

        assert_eq!(
            err,
            ChatError::AuthInvalid {
                provider: Provider::Qwen
            }
        );
        assert_eq!(h.store.get("apiKey_qwen"), None);
        assert_eq!(h.session.pending_message(), Some("explain borrowing"));
        assert_eq!(h.session.state(), TurnState::PendingAuth);
        assert!(h.session.log().is_empty());
        assert_eq!(h.sink.errors(), vec![REJECTED_KEY_NOTICE.to_string()]);
        assert_eq!(
            h.sink.key_requests(),
            vec![(Provider::Qwen, KeyPrompt::Rejected)]
        );

        h.transport.push(frames(&["Ownership", " rules"]));
        h.session.submit_api_key("sk-fresh").await.unwrap();

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].api_key, "sk-fresh");
        assert_eq!(sent[1].messages, sent[0].messages);
        assert_eq!(
            h.session.log().turns(),
            &[
                ChatMessage::user("explain borrowing"),
                ChatMessage::assistant("Ownership rules")
            ]
        );
    }

    #[tokio::test]
    async fn test_key_for_waiting_provider_resends_message() {
        let mut h = harness("qwen-max", None, vec![frames(&["hi there"])]);
        assert!(h.session.submit("hello").await.is_err());

        // A key for another provider leaves the message waiting.
        assert_eq!(
            h.session
                .provide_api_key(Provider::Hunyuan, "sk-hy")
                .await
                .unwrap(),
            TurnOutcome::Ignored
        );
        assert_eq!(h.session.state(), TurnState::PendingAuth);
        assert_eq!(h.session.pending_message(), Some("hello"));
        assert!(h.transport.sent().is_empty());

        let outcome = h
            .session
            .provide_api_key(Provider::Qwen, "sk-real")
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed(_)));
        assert_eq!(h.session.state(), TurnState::Completed);
        assert_eq!(h.session.pending_message(), None);
        assert_eq!(h.store.get("apiKey_qwen").as_deref(), Some("sk-real"));

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].api_key, "sk-real");
        assert_eq!(sent[0].messages.last().unwrap(), &ChatMessage::user("hello"));

        // The next line is a chat message again, not a key.
        h.transport.push(frames(&["Rust is a language"]));
        h.session.submit("what is rust?").await.unwrap();
        assert_eq!(h.store.get("apiKey_qwen").as_deref(), Some("sk-real"));
        assert_eq!(h.transport.sent()[1].api_key, "sk-real");
    }

    #[tokio::test]
    async fn test_server_error_is_shown_not_retried() {
        let mut h = harness(
            "deepseek-reasoner",
            Some("sk-ds"),
            vec![Script::status(500, "upstream exploded")],
        );
        let err = h.session.submit("hi").await.unwrap_err();

        assert_eq!(
            err,
            ChatError::Http {
                status: 500,
                detail: "upstream exploded".into()
            }
        );
        assert_eq!(h.session.state(), TurnState::Failed);
        assert_eq!(h.session.pending_message(), None);
        assert!(h.session.log().is_empty());
        assert_eq!(h.transport.sent().len(), 1);
        assert_eq!(h.store.get("apiKey_deepseek").as_deref(), Some("sk-ds"));
        let errors = h.sink.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("500"));
        assert!(errors[0].contains("upstream exploded"));
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let mut h = harness(
            "deepseek-chat",
            Some("sk-ds"),
            vec![Script::Refuse(ChatError::Transport("dns failure".into()))],
        );
        let err = h.session.submit("hi").await.unwrap_err();
        assert_eq!(err, ChatError::Transport("dns failure".into()));
        assert_eq!(h.session.state(), TurnState::Failed);
        assert!(h.sink.errors()[0].contains("dns failure"));
    }

    #[tokio::test]
    async fn test_read_error_mid_stream_discards_reply() {
        let mut h = harness(
            "deepseek-chat",
            Some("sk-ds"),
            vec![Script::Respond {
                status: 200,
                chunks: vec![
                    Ok(content_frame("partial").into_bytes()),
                    Err(ChatError::Transport("stream read error: reset".into())),
                ],
            }],
        );
        assert!(h.session.submit("hi").await.is_err());
        assert_eq!(h.session.state(), TurnState::Failed);
        assert!(h.session.log().is_empty());
        assert_eq!(h.sink.renders(Channel::Content).len(), 1);
    }

    #[tokio::test]
    async fn test_reasoning_kept_out_of_log() {
        let think = reasoning_frame("thinking...");
        let answer = content_frame("42");
        let mut h = harness(
            "deepseek-reasoner",
            Some("sk-ds"),
            vec![Script::ok(&[think.as_str(), "data: garbage\n", answer.as_str()])],
        );
        match h.session.submit("meaning of life").await.unwrap() {
            TurnOutcome::Completed(buffers) => {
                assert_eq!(buffers.reasoning, "thinking...");
                assert_eq!(buffers.content, "42");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(h.session.log().turns()[1], ChatMessage::assistant("42"));
    }

    #[tokio::test]
    async fn test_blank_message_is_ignored() {
        let mut h = harness("deepseek-chat", Some("sk-ds"), vec![]);
        assert_eq!(h.session.submit("   \n").await.unwrap(), TurnOutcome::Ignored);
        assert!(h.transport.sent().is_empty());
        assert!(h.sink.events().is_empty());
        assert_eq!(h.session.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_unknown_model_uses_deepseek_key() {
        let mut h = harness("gpt-4o", None, vec![frames(&["hi"])]);
        h.store.set("apiKey_deepseek", "sk-ds").unwrap();
        let binding = h.session.binding();
        assert!(binding.fallback);
        assert_eq!(binding.provider, Provider::Deepseek);

        h.session.submit("hello").await.unwrap();
        let sent = h.transport.sent();
        assert_eq!(sent[0].api_key, "sk-ds");
        assert_eq!(sent[0].model, "gpt-4o");
        assert_eq!(sent[0].endpoint, Provider::Deepseek.default_endpoint());
    }

    #[tokio::test]
    async fn test_key_management_and_preferences() {
        let mut h = harness("deepseek-chat", None, vec![]);
        assert!(h.session.key_status().iter().all(|(_, set)| !set));

        assert_eq!(
            h.session.set_api_key(Provider::Hunyuan, "  "),
            Err(ChatError::EmptyApiKey)
        );
        h.session.set_api_key(Provider::Hunyuan, "sk-hy").unwrap();
        assert_eq!(
            h.session.key_status(),
            vec![
                (Provider::Deepseek, false),
                (Provider::Qwen, false),
                (Provider::Hunyuan, true)
            ]
        );
        h.session.remove_api_key(Provider::Hunyuan).unwrap();
        assert!(h.session.api_key(Provider::Hunyuan).is_none());

        // Submitting a key with nothing pending only stores it.
        assert_eq!(
            h.session.submit_api_key("sk-ds").await.unwrap(),
            TurnOutcome::Ignored
        );
        assert_eq!(h.store.get("apiKey_deepseek").as_deref(), Some("sk-ds"));

        h.session.select_model("qwen-plus").unwrap();
        assert_eq!(h.store.get(SELECTED_MODEL_KEY).as_deref(), Some("qwen-plus"));
        assert_eq!(h.session.binding().provider, Provider::Qwen);

        assert!(h.session.toggle_dark_mode().unwrap());
        assert_eq!(h.store.get(DARK_MODE_KEY).as_deref(), Some("true"));
        assert!(!h.session.toggle_dark_mode().unwrap());
    }

    #[tokio::test]
    async fn test_reset_and_transcript() {
        let mut h = harness("deepseek-chat", Some("sk-ds"), vec![frames(&["pong"])]);
        assert!(h.session.transcript().is_none());
        h.session.submit("ping").await.unwrap();

        let text = h.session.transcript().unwrap().render();
        assert!(text.contains("Model: deepseek-chat\n"));
        assert!(text.ends_with("User:\nping\n\nAI:\npong\n\n"));

        h.session.reset();
        assert!(h.session.log().is_empty());
        assert!(h.session.transcript().is_none());
        assert_eq!(h.session.state(), TurnState::Idle);
    }
}
