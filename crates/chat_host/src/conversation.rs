//! The conversation log of the active session.

use shared::agent_api::{ChatMessage, Role};

/// Completed exchanges in chronological order.
///
/// Only user and assistant turns are stored. The system prompt is added when
/// a request is built, and a user turn is recorded together with the reply
/// that completed it, so the log always alternates user/assistant.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    turns: Vec<ChatMessage>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Message list for the next request: the system prompt, all prior
    /// turns in order, then the new user message.
    pub fn request_messages(&self, system_prompt: &str, user_message: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(self.turns.iter().cloned());
        messages.push(ChatMessage::user(user_message));
        messages
    }

    /// Append a finished exchange.
    pub(crate) fn commit_exchange(&mut self, user_message: &str, reply: &str) {
        self.turns.push(ChatMessage::user(user_message));
        self.turns.push(ChatMessage::assistant(reply));
    }

    pub(crate) fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn count(&self, role: Role) -> usize {
        self.turns.iter().filter(|t| t.role == role).count()
    }
}
