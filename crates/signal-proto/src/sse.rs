/// Marker that prefixes every payload line of an event stream.
pub const DATA_PREFIX: &str = "data:";

/// Incremental decoder for `text/event-stream` bodies.
///
/// Bytes are buffered until a `\n` arrives, so lines (and multi-byte
/// characters) split across network chunks come out whole. Only `data:`
/// lines are yielded; comments, `event:` fields and blank separators are
/// dropped.
#[derive(Debug, Default)]
pub struct EventLineDecoder {
    buffer: Vec<u8>,
}

impl EventLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the payloads of every completed data line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let text = String::from_utf8_lossy(&line[..newline]);
            if let Some(payload) = text.trim().strip_prefix(DATA_PREFIX) {
                payloads.push(payload.trim().to_string());
            }
        }
        payloads
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
