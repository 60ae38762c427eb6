use canvas_core::extract_values;
use serde_json::Value;

/// One decoded frame of the inbound stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// A (possibly partial) action value, extended with `complete`/`time`.
    Action(Value),
    /// The service reported a failure mid-stream.
    Error {
        code: Option<String>,
        message: Option<String>,
    },
    /// A data payload that could not be decoded at all.
    Malformed(String),
    /// `data: [DONE]`.
    Done,
}

/// Incremental parser for SSE byte streams.
///
/// Bytes are buffered until a blank line closes a frame, so multi-byte
/// characters split across network chunks survive intact.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: Vec<u8>,
    done: bool,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete frames.
    ///
    /// Frames after `[DONE]` are ignored.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamFrame> {
        self.buffer.extend(bytes.iter().filter(|byte| **byte != b'\r'));
        let mut frames = Vec::new();

        while let Some(split) = find_frame_end(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..split + 2).collect();
            if self.done {
                continue;
            }
            let frame = String::from_utf8_lossy(&raw[..split]);
            let Some(payload) = extract_data_payload(&frame) else {
                continue;
            };

            if payload == "[DONE]" {
                self.done = true;
                frames.push(StreamFrame::Done);
                continue;
            }
            frames.extend(decode_payload(&payload));
        }

        frames
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<StreamFrame> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\n\n")
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn decode_payload(payload: &str) -> Vec<StreamFrame> {
    if let Ok(value) = serde_json::from_str::<Value>(payload) {
        return map_value(value).into_iter().collect();
    }

    // Some senders pack several objects into one frame.
    let (values, rest) = extract_values(payload);
    if values.is_empty() || !rest.trim().is_empty() {
        return vec![StreamFrame::Malformed(payload.to_string())];
    }
    values.into_iter().filter_map(map_value).collect()
}

fn map_value(value: Value) -> Option<StreamFrame> {
    let object = value.as_object()?;

    if let Some(error) = object.get("error") {
        let (code, message) = match error {
            Value::String(message) => (None, Some(message.clone())),
            Value::Object(fields) => (
                fields
                    .get("code")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                fields
                    .get("message")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
            ),
            _ => (None, None),
        };
        return Some(StreamFrame::Error { code, message });
    }

    Some(StreamFrame::Action(value))
}

#[cfg(test)]
mod tests {
    use super::{SseStreamParser, StreamFrame};

    #[test]
    fn parse_sse_frames_incrementally() {
        let mut parser = SseStreamParser::default();
        let mut frames = Vec::new();

        frames.extend(parser.feed(b"data: {\"_type\":\"think\",\"text\":\"hm\""));
        assert!(frames.is_empty());
        frames.extend(parser.feed(b",\"complete\":false,\"time\":3}\n\n"));
        assert_eq!(frames.len(), 1);

        frames.extend(parser.feed(b"data: [DONE]\n\n"));
        assert_eq!(frames.last(), Some(&StreamFrame::Done));
        assert!(parser.is_done());
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn split_utf8_sequences_are_reassembled() {
        let frame = "data: {\"_type\":\"message\",\"text\":\"caf\u{e9}\"}\n\n".as_bytes();
        let split = frame
            .iter()
            .position(|byte| *byte == 0xC3)
            .expect("encoded e-acute present")
            + 1;

        let mut parser = SseStreamParser::default();
        assert!(parser.feed(&frame[..split]).is_empty());
        let frames = parser.feed(&frame[split..]);

        let StreamFrame::Action(value) = &frames[0] else {
            panic!("expected action frame, got {frames:?}");
        };
        assert_eq!(value["text"], "caf\u{e9}");
    }
}
