//! Rendering side effects.
//!
//! The session never touches a display directly. It calls a `RenderSink`,
//! and `RenderDriver` sits in between to format text and throttle scrolling.

use crate::formatter::format_message;
use providers::Provider;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Trailing window for scroll-to-bottom requests.
pub const SCROLL_DEBOUNCE: Duration = Duration::from_millis(100);

/// Which accumulator an update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Reasoning,
    Content,
}

/// Why the user is asked for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPrompt {
    Missing,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollRequest {
    pub smooth: bool,
    /// Render revision this scroll reflects. Increases with every render.
    pub revision: u64,
}

pub trait RenderSink: Send + Sync {
    fn user_turn(&self, text: &str);
    fn assistant_turn_started(&self, provider: Provider, model: &str);
    /// Full accumulated text of `channel` and its HTML rendering.
    fn render(&self, channel: Channel, raw: &str, html: &str);
    fn error(&self, raw: &str, html: &str);
    fn scroll_to_bottom(&self, request: ScrollRequest);
    fn loading(&self, active: bool);
    fn request_api_key(&self, provider: Provider, reason: KeyPrompt);
}

/// Collapses bursts of scroll requests: only the last one in a quiet
/// window runs. Earlier ones are dropped, not queued.
pub struct ScrollDebouncer {
    sink: Arc<dyn RenderSink>,
    window: Duration,
    pending: Option<JoinHandle<()>>,
}

impl ScrollDebouncer {
    pub fn new(sink: Arc<dyn RenderSink>, window: Duration) -> Self {
        Self {
            sink,
            window,
            pending: None,
        }
    }

    /// Must be called inside a tokio runtime.
    pub fn request(&mut self, revision: u64) {
        self.cancel();
        let sink = self.sink.clone();
        let window = self.window;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            sink.scroll_to_bottom(ScrollRequest {
                smooth: true,
                revision,
            });
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for ScrollDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct RenderDriver {
    sink: Arc<dyn RenderSink>,
    scroll: ScrollDebouncer,
    revision: u64,
}

impl RenderDriver {
    pub fn new(sink: Arc<dyn RenderSink>) -> Self {
        Self::with_window(sink, SCROLL_DEBOUNCE)
    }

    pub fn with_window(sink: Arc<dyn RenderSink>, window: Duration) -> Self {
        Self {
            scroll: ScrollDebouncer::new(sink.clone(), window),
            sink,
            revision: 0,
        }
    }

    pub fn sink(&self) -> &Arc<dyn RenderSink> {
        &self.sink
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Announce a new assistant turn and jump to the bottom at once.
    pub fn begin_turn(&mut self, provider: Provider, model: &str) {
        self.sink.assistant_turn_started(provider, model);
        self.scroll_now(false);
    }

    /// Re-render the whole buffer right away; the scroll that follows is
    /// debounced.
    pub fn render(&mut self, channel: Channel, raw: &str) {
        let html = format_message(raw);
        self.revision += 1;
        self.sink.render(channel, raw, &html);
        self.scroll.request(self.revision);
    }

    /// End of a successful turn: drop any pending scroll, scroll once now.
    pub fn finish(&mut self) {
        self.scroll_now(true);
    }

    /// Show an error block in place of the reply.
    pub fn fail(&mut self, message: &str) {
        let html = format_message(message);
        self.revision += 1;
        self.sink.error(message, &html);
        self.scroll_now(true);
    }

    fn scroll_now(&mut self, smooth: bool) {
        self.scroll.cancel();
        self.sink.scroll_to_bottom(ScrollRequest {
            smooth,
            revision: self.revision,
        });
    }
}
