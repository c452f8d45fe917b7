//! Chat Host - the streaming chat session
//!
//! This crate drives one conversation with a chat-completion provider:
//! - Keeps the conversation log and the pending (unsent) message
//! - Resolves the provider and API key for the selected model
//! - Consumes the streamed reply, splitting reasoning from final content
//! - Re-renders through a `RenderSink` and debounces scroll-to-bottom
//! - Exports the conversation as a plain-text transcript

pub mod consumer;
pub mod conversation;
pub mod formatter;
pub mod render;
pub mod session;
pub mod transcript;

#[cfg(test)]
pub(crate) mod test_support;

pub use consumer::{RenderBuffers, StreamConsumer};
pub use conversation::ConversationLog;
pub use formatter::{format_message, Block};
pub use render::{Channel, KeyPrompt, RenderDriver, RenderSink, ScrollDebouncer, ScrollRequest};
pub use session::{ChatSession, TurnOutcome, TurnState};
pub use transcript::Transcript;
