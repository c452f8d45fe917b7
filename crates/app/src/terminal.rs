//! Terminal rendering of a chat session.
//!
//! The session hands over the whole accumulated text on every update; the
//! terminal can only append, so `PrintState` works out the unseen suffix.

use chat_host::{Channel, KeyPrompt, RenderSink, ScrollRequest};
use colored::{Color, Colorize};
use parking_lot::Mutex;
use providers::Provider;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

/// Text to print for one update.
#[derive(Debug, PartialEq, Eq)]
pub struct Update<'r> {
    /// Channel printed before this one, when output moved between channels
    /// within the same turn.
    pub switched_from: Option<Channel>,
    pub text: &'r str,
}

#[derive(Debug, Default)]
pub struct PrintState {
    reasoning: usize,
    content: usize,
    current: Option<Channel>,
}

impl PrintState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Part of `raw` not printed yet for `channel`. Returns `None` when
    /// there is nothing new.
    pub fn advance<'r>(&mut self, channel: Channel, raw: &'r str) -> Option<Update<'r>> {
        let printed = match channel {
            Channel::Reasoning => &mut self.reasoning,
            Channel::Content => &mut self.content,
        };
        // Buffers only grow; anything else means a new turn slipped in.
        let text = raw.get(*printed..).unwrap_or(raw);
        *printed = raw.len();
        if text.is_empty() {
            return None;
        }
        let switched_from = self.current.filter(|c| *c != channel);
        self.current = Some(channel);
        Some(Update {
            switched_from,
            text,
        })
    }
}

struct Palette {
    user: Color,
    header: Color,
    reasoning: Color,
    content: Color,
}

const DARK: Palette = Palette {
    user: Color::BrightCyan,
    header: Color::BrightMagenta,
    reasoning: Color::BrightBlack,
    content: Color::BrightWhite,
};

const LIGHT: Palette = Palette {
    user: Color::Blue,
    header: Color::Magenta,
    reasoning: Color::BrightBlack,
    content: Color::Black,
};

pub struct TerminalSink {
    state: Mutex<PrintState>,
    dark: AtomicBool,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PrintState::default()),
            dark: AtomicBool::new(false),
        }
    }

    pub fn set_dark(&self, dark: bool) {
        self.dark.store(dark, Ordering::Relaxed);
    }

    fn palette(&self) -> &'static Palette {
        if self.dark.load(Ordering::Relaxed) {
            &DARK
        } else {
            &LIGHT
        }
    }

    /// Out-of-band notice, e.g. the outcome of a command.
    pub fn notice(&self, text: &str) {
        println!("{}", text.color(self.palette().header));
    }

    pub fn warn(&self, text: &str) {
        eprintln!("{}", text.yellow());
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSink for TerminalSink {
    fn user_turn(&self, text: &str) {
        println!("{} {}", "You:".bold().color(self.palette().user), text);
    }

    fn assistant_turn_started(&self, provider: Provider, model: &str) {
        self.state.lock().reset();
        println!(
            "{}",
            format!("{} ({})", provider.display_name(), model)
                .bold()
                .color(self.palette().header)
        );
    }

    fn render(&self, channel: Channel, raw: &str, _html: &str) {
        let palette = self.palette();
        let mut state = self.state.lock();
        let Some(update) = state.advance(channel, raw) else {
            return;
        };
        if update.switched_from.is_some() {
            println!("\n");
        }
        match channel {
            Channel::Reasoning => {
                print!("{}", update.text.italic().color(palette.reasoning))
            }
            Channel::Content => print!("{}", update.text.color(palette.content)),
        }
    }

    fn error(&self, raw: &str, _html: &str) {
        self.state.lock().reset();
        println!("\n{}", raw.red());
    }

    fn scroll_to_bottom(&self, _request: ScrollRequest) {
        // Stdout is always at the bottom; flushing is what makes it visible.
        if let Err(e) = std::io::stdout().flush() {
            tracing::debug!(error = %e, "stdout flush failed");
        }
    }

    fn loading(&self, active: bool) {
        if active {
            println!("{}", "...".dimmed());
        } else {
            println!();
        }
    }

    fn request_api_key(&self, provider: Provider, reason: KeyPrompt) {
        let text = match reason {
            KeyPrompt::Missing => format!("Please enter your {} API key.", provider),
            KeyPrompt::Rejected => format!(
                "The {} API key was rejected. Please enter a valid key.",
                provider
            ),
        };
        println!("{}", text.yellow());
    }
}
