//! Consumes one streamed chat-completion body.

use crate::render::{Channel, RenderDriver};
use futures::StreamExt;
use providers::openai::{StreamDelta, StreamFrame, DONE_SENTINEL};
use providers::sse::{SseEvent, SseParser};
use providers::{ByteStream, ChatError};

/// Text accumulated for the in-flight assistant turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderBuffers {
    pub reasoning: String,
    pub content: String,
    /// `finish_reason` of the last frame that carried one.
    pub finish_reason: Option<String>,
}

/// Reads a body chunk by chunk, decodes `data:` frames and appends their
/// deltas to the matching buffer, re-rendering after each one.
///
/// A frame that fails to decode is logged and skipped. A transport error
/// ends consumption and the buffers are discarded.
pub struct StreamConsumer<'a> {
    driver: &'a mut RenderDriver,
    parser: SseParser,
    buffers: RenderBuffers,
    frames: usize,
    skipped: usize,
}

impl<'a> StreamConsumer<'a> {
    pub fn new(driver: &'a mut RenderDriver) -> Self {
        Self {
            driver,
            parser: SseParser::new(),
            buffers: RenderBuffers::default(),
            frames: 0,
            skipped: 0,
        }
    }

    pub async fn consume(mut self, mut body: ByteStream) -> Result<RenderBuffers, ChatError> {
        while let Some(chunk) = body.next().await {
            let bytes = chunk?;
            for event in self.parser.feed(&bytes) {
                self.handle(event);
            }
        }
        if let Some(event) = self.parser.finish() {
            self.handle(event);
        }
        tracing::debug!(
            frames = self.frames,
            skipped = self.skipped,
            reasoning_chars = self.buffers.reasoning.chars().count(),
            content_chars = self.buffers.content.chars().count(),
            finish_reason = self.buffers.finish_reason.as_deref().unwrap_or("none"),
            "stream ended"
        );
        Ok(self.buffers)
    }

    fn handle(&mut self, event: SseEvent) {
        let data = event.data.trim();
        if data.is_empty() || data == DONE_SENTINEL {
            return;
        }
        match StreamFrame::parse(data) {
            Ok(frame) => {
                self.frames += 1;
                if let Some(delta) = frame.delta() {
                    self.apply(delta);
                }
                if let Some(reason) = frame.finish_reason() {
                    self.buffers.finish_reason = Some(reason.to_string());
                }
            }
            Err(e) => {
                self.skipped += 1;
                let err = ChatError::FrameParse {
                    line: data.chars().take(200).collect(),
                    message: e.to_string(),
                };
                tracing::warn!(error = %err, line = %data, "skipping stream frame");
            }
        }
    }

    /// Both fields are routed independently; a frame may carry either or
    /// both.
    fn apply(&mut self, delta: &StreamDelta) {
        if let Some(text) = delta.reasoning_content.as_deref().filter(|t| !t.is_empty()) {
            self.buffers.reasoning.push_str(text);
            self.driver.render(Channel::Reasoning, &self.buffers.reasoning);
        }
        if let Some(text) = delta.content.as_deref().filter(|t| !t.is_empty()) {
            self.buffers.content.push_str(text);
            self.driver.render(Channel::Content, &self.buffers.content);
        }
    }
}
