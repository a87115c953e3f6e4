//! Line framing for `text/event-stream` bodies.

use memchr::memchr;

/// Accumulates raw body chunks and yields complete, trimmed, non-empty lines.
#[derive(Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        self.drain_lines(false)
    }

    /// Flushes whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<String> {
        self.drain_lines(true)
    }

    fn drain_lines(&mut self, flush: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;

        while let Some(relative) = memchr(b'\n', &self.buffer[start..]) {
            let newline = start + relative;
            match std::str::from_utf8(&self.buffer[start..newline]) {
                Ok(text) => push_trimmed(&mut lines, text),
                Err(err) => tracing::debug!(error = %err, "Dropping non UTF-8 event-stream line"),
            }
            start = newline + 1;
        }

        if flush {
            if let Ok(text) = std::str::from_utf8(&self.buffer[start..]) {
                push_trimmed(&mut lines, text);
            }
            self.buffer.clear();
        } else if start > 0 {
            self.buffer.drain(..start);
        }

        lines
    }
}

fn push_trimmed(lines: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        lines.push(trimmed.to_string());
    }
}

/// Accepts both `data: x` and `data:x`.
pub fn sse_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

pub fn is_event_stream_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|value| value.eq_ignore_ascii_case("text/event-stream"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_handles_partial_and_crlf_lines() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: one").is_empty());
        assert_eq!(buffer.push(b"\r\n\r\ndata: tw"), vec!["data: one"]);
        assert_eq!(buffer.push(b"o\n"), vec!["data: two"]);
        assert!(buffer.finish().is_empty());
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: [DONE]").is_empty());
        assert_eq!(buffer.finish(), vec!["data: [DONE]"]);
    }

    #[test]
    fn extracts_payload_with_and_without_space() {
        assert_eq!(sse_data_payload("data: {\"id\":1}"), Some("{\"id\":1}"));
        assert_eq!(sse_data_payload("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data_payload("event: ping"), None);
    }

    #[test]
    fn detects_event_stream_content_type() {
        assert!(is_event_stream_content_type("text/event-stream; charset=utf-8"));
        assert!(!is_event_stream_content_type("application/json"));
    }
}
