use serde_json::Value;

use crate::chat::format::{Markup, format_lines};
use crate::chat::transcript::{BotHandle, Transcript};
use crate::parse::response::resolve_batch_text;

const REPLACEMENT: char = '\u{FFFD}';

/// Incremental UTF-8 decoder. A multi-byte sequence split across chunks is held
/// back until its remaining bytes arrive; invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);

        let mut out = String::with_capacity(buf.len());
        let mut rest: &[u8] = &buf;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            rest = &rest[valid + len..];
                        }
                        None => {
                            self.pending = rest[valid..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flushes a dangling partial sequence at end of stream.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        REPLACEMENT.to_string()
    }
}

/// Decoder plus accumulated text for one streamed reply. Dropped when the stream ends.
#[derive(Debug)]
pub struct StreamSession {
    handle: BotHandle,
    decoder: Utf8Decoder,
    accumulated: String,
}

impl StreamSession {
    pub fn new(handle: BotHandle) -> Self {
        Self {
            handle,
            decoder: Utf8Decoder::default(),
            accumulated: String::new(),
        }
    }

    pub fn handle(&self) -> BotHandle {
        self.handle
    }

    #[cfg(test)]
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Appends a chunk and returns markup for everything received so far.
    pub fn push(&mut self, chunk: &[u8]) -> Markup {
        let text = self.decoder.decode(chunk);
        self.accumulated.push_str(&text);
        format_lines(&self.accumulated)
    }

    /// Returns updated markup only if flushing the decoder changed the text.
    pub fn finish(&mut self) -> Option<Markup> {
        let tail = self.decoder.finish();
        if tail.is_empty() {
            return None;
        }
        self.accumulated.push_str(&tail);
        Some(format_lines(&self.accumulated))
    }
}

/// Renders a whole batch payload as one bot message.
pub fn consume_batch(transcript: &mut Transcript, payload: &Value, fallback: &str) {
    let text = resolve_batch_text(payload, fallback);
    transcript.append_bot_message(format_lines(&text));
}

/// Feeds one streamed chunk into the session and refreshes its placeholder.
pub fn consume_chunk(transcript: &mut Transcript, session: &mut StreamSession, chunk: &[u8]) {
    let markup = session.push(chunk);
    transcript.update_bot_text(session.handle(), markup);
}

/// Flushes the session at end of stream.
pub fn finish_stream(transcript: &mut Transcript, session: &mut StreamSession) {
    if let Some(markup) = session.finish() {
        transcript.update_bot_text(session.handle(), markup);
    }
}
