//! Line decoder for the `data: ` framing chat-completion endpoints stream.
//!
//! The body is newline-delimited. Lines carrying `data:` hold one JSON
//! payload each; every other line (blank separators, `event:`, `id:`,
//! `:` comments) is ignored.

/// A single `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub data: String,
}

/// Incremental decoder that buffers incomplete lines across chunk
/// boundaries. Buffering happens on bytes, so a multi-byte character split
/// between two chunks decodes intact.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the HTTP response. Returns the payloads of every
    /// line completed by this chunk, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(event) = parse_line(&self.buffer[start..end]) {
                events.push(event);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);

        events
    }

    /// Flush a trailing line that ended without a newline. Call once the
    /// transport reports end of stream.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(raw);
    let line = line.strip_suffix('\r').unwrap_or(&line);
    let data = line.strip_prefix("data:")?;
    Some(SseEvent {
        data: data.strip_prefix(' ').unwrap_or(data).to_string(),
    })
}
