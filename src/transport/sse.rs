//! Server-Sent Events (SSE) framing.
//!
//! The decoder is fed raw body chunks as they arrive and hands back every
//! event completed by that chunk. Lines may be split across chunks, so
//! partial lines stay buffered until their newline shows up.

use super::types::NamedEvent;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk, returning the events it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<NamedEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.feed_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush whatever is left once the body ends
    pub fn finish(&mut self) -> Option<NamedEvent> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw).into_owned();
            if let Some(event) = self.feed_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn feed_line(&mut self, line: &str) -> Option<NamedEvent> {
        // Empty line = end of event
        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            return None; // comment / keep-alive
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(value);
            }
            _ => {} // id:, retry:
        }
        None
    }

    fn dispatch(&mut self) -> Option<NamedEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(NamedEvent {
            event,
            data: std::mem::take(&mut self.data),
        })
    }
}
