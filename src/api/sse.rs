//! Incremental parser for `text/event-stream` framing.
//!
//! The progress endpoint pushes server-sent events over a long-lived
//! response body. Chunks arrive at arbitrary boundaries (mid-line, even
//! mid-event), so the parser buffers bytes and yields only complete events.
//! It does no I/O and no JSON: the listener owns the connection and the
//! payloads.

/// One complete event from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Event name from the `event:` field; `"message"` when absent.
    pub event: String,
    /// Concatenated `data:` lines, joined with `\n`.
    pub data: String,
}

/// Stateful push parser. Feed it raw chunks, collect finished messages.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk of bytes, returning every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop(); // trailing \n
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(message) = self.process_line(&line) {
                messages.push(message);
            }
        }
        messages
    }

    fn process_line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            return self.dispatch();
        }
        // Comment lines keep the connection alive; nothing to do.
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // "id" and "retry" are legal fields this client doesn't use.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        // Per the event-stream spec, an event with an empty data buffer is
        // dropped rather than dispatched.
        if data.is_empty() {
            return None;
        }
        Some(SseMessage {
            event: event.unwrap_or_else(|| "message".to_string()),
            data: data.join("\n"),
        })
    }
}
