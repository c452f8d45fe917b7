//! Turns raw assistant text into HTML display blocks.
//!
//! Handles the loose markdown the chat models produce:
//! - `**bold**` anywhere on a line
//! - `###` as a section break
//! - `1. Title` numbered headings
//! - `- Sub heading` dashed sub-headings
//! - `Label: text` lines
//!
//! Everything else becomes a plain paragraph. Input is HTML-escaped before
//! any markup is added.

use regex::Regex;
use std::sync::LazyLock;

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("bold pattern"));
static NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+\.").expect("numbered pattern"));

const SECTION_MARKER: &str = "###";

/// One rendered line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// `1. Step` - kept whole.
    SectionTitle(String),
    /// `- item`, dash removed.
    Subsection(String),
    /// `Key: Value`, split at the first colon.
    Labeled { label: String, body: String },
    Paragraph(String),
}

impl Block {
    /// Classify one trimmed, non-empty line. First match wins.
    pub fn classify(line: &str) -> Block {
        if NUMBERED.is_match(line) {
            Block::SectionTitle(line.to_string())
        } else if let Some(rest) = line.strip_prefix('-') {
            Block::Subsection(rest.trim().to_string())
        } else if let Some((label, body)) = line.split_once(':') {
            Block::Labeled {
                label: label.trim().to_string(),
                body: body.trim().to_string(),
            }
        } else {
            Block::Paragraph(line.to_string())
        }
    }

    pub fn write_html(&self, out: &mut String) {
        match self {
            Block::SectionTitle(text) => {
                out.push_str(r#"<p class="section-title">"#);
                out.push_str(text);
                out.push_str("</p>");
            }
            Block::Subsection(text) => {
                out.push_str(r#"<p class="subsection"><span class="bold-text">"#);
                out.push_str(text);
                out.push_str("</span></p>");
            }
            Block::Labeled { label, body } => {
                out.push_str(r#"<p><span class="subtitle">"#);
                out.push_str(label);
                out.push_str("</span>: ");
                out.push_str(body);
                out.push_str("</p>");
            }
            Block::Paragraph(text) => {
                out.push_str("<p>");
                out.push_str(text);
                out.push_str("</p>");
            }
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape, then wrap every `**x**` in an emphasis span. `.` never crosses a
/// newline, so markers pair up within a line only.
fn emphasize(text: &str) -> String {
    BOLD.replace_all(&escape_html(text), r#"<span class="bold-text">$1</span>"#)
        .into_owned()
}

/// Split `text` into display blocks, in source order.
pub fn format_blocks(text: &str) -> Vec<Block> {
    if text.is_empty() {
        return Vec::new();
    }
    emphasize(text)
        .split(SECTION_MARKER)
        .filter(|section| !section.trim().is_empty())
        .flat_map(|section| {
            section
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(Block::classify)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Render raw assistant text to HTML. Empty input gives empty output.
pub fn format_message(text: &str) -> String {
    let mut out = String::new();
    for block in format_blocks(text) {
        block.write_html(&mut out);
    }
    out
}
