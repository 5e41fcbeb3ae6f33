//! Line-oriented SSE decoding for LLM streaming responses.
//!
//! Bytes are buffered until a full line is available, decoded to UTF-8 at
//! line boundaries (never mid-chunk), and handed to a vendor [`SseDecoder`].

use std::fmt;

use async_stream::try_stream;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::LlmError;
use super::http;
use super::provider::ChunkStream;

/// Max bytes held for one unfinished line (1MB)
const MAX_LINE_BUFFER: usize = 1_048_576;

/// What one SSE line means to a vendor decoder
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// Text delta to hand to the caller
    Text(String),
    /// Nothing to emit (comment, keep-alive, metadata event, noise)
    Skip,
    /// Terminal marker; stop reading the body
    Done,
    /// The provider reported a failure inside the stream
    Fail(LlmError),
}

/// Vendor-specific interpretation of SSE lines.
///
/// Decoders see every non-empty line with the line terminator removed and
/// may keep state across lines.
pub trait SseDecoder: Send + 'static {
    fn decode_line(&mut self, line: &str) -> LineEvent;
}

/// Accumulates raw bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), LlmError> {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > MAX_LINE_BUFFER && !self.buf.contains(&b'\n') {
            tracing::error!(limit = MAX_LINE_BUFFER, "SSE line exceeded buffer limit, aborting");
            return Err(LlmError::InvalidResponse);
        }
        Ok(())
    }

    /// Next complete line, without its `\n` or `\r\n`
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the transport closed
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        let line = String::from_utf8_lossy(&rest);
        let line = line.trim_end_matches('\r');
        (!line.is_empty()).then(|| line.to_string())
    }
}

/// Payload of a `data:` line, if this is one
fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Decode a payload as `T`, separating noise from shape mismatches.
///
/// Non-JSON payloads are expected on the wire and logged at trace level;
/// valid JSON that does not fit `T` is more likely a decode bug and gets a
/// debug event. Both are skipped.
fn decode_payload<T: serde::de::DeserializeOwned>(payload: &str, vendor: &str) -> Option<T> {
    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(_) => {
            tracing::trace!(vendor, payload, "Skipping non-JSON SSE line");
            return None;
        }
    };
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::debug!(
                vendor,
                error = %e,
                payload,
                "SSE JSON did not match expected chunk shape"
            );
            None
        }
    }
}

/// Turn a raw byte stream into text chunks using `decoder`.
///
/// Stops at the decoder's terminal marker or when the byte stream ends.
/// Dropping the returned stream stops reading at the next chunk boundary.
pub fn decode_sse<S, E, D>(
    byte_stream: S,
    mut decoder: D,
) -> impl Stream<Item = Result<String, LlmError>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
    D: SseDecoder,
{
    try_stream! {
        let mut byte_stream = byte_stream;
        let mut lines = LineBuffer::default();
        let mut emitted = 0usize;
        let mut finished = false;

        'read: while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(|e| {
                tracing::warn!(error = %e, emitted, "SSE read error");
                LlmError::InvalidResponse
            })?;
            lines.push(&bytes)?;

            while let Some(line) = lines.next_line() {
                if line.is_empty() {
                    continue;
                }
                match decoder.decode_line(&line) {
                    LineEvent::Text(text) => {
                        emitted += 1;
                        yield text;
                    }
                    LineEvent::Skip => {}
                    LineEvent::Done => {
                        finished = true;
                        break 'read;
                    }
                    LineEvent::Fail(err) => Err(err)?,
                }
            }
        }

        if !finished {
            if let Some(line) = lines.finish() {
                match decoder.decode_line(&line) {
                    LineEvent::Text(text) => {
                        emitted += 1;
                        yield text;
                    }
                    LineEvent::Fail(err) => Err(err)?,
                    LineEvent::Skip | LineEvent::Done => {}
                }
            }
        }

        tracing::debug!(chunks = emitted, terminated = finished, "SSE stream closed");
    }
}

/// Dispatch a streaming request and decode its body with `decoder`.
///
/// Request-build errors surface as the first stream item.
pub(crate) fn open_sse<D: SseDecoder>(
    client: reqwest::Client,
    request: Result<reqwest::Request, LlmError>,
    secret: String,
    decoder: D,
) -> ChunkStream {
    Box::pin(response_chunks(client, request, secret, decoder))
}

fn response_chunks<D: SseDecoder>(
    client: reqwest::Client,
    request: Result<reqwest::Request, LlmError>,
    secret: String,
    decoder: D,
) -> impl Stream<Item = Result<String, LlmError>> + Send {
    try_stream! {
        let request = request?;
        let response = http::execute(&client, request, &secret).await?;
        // Gemini carries its key in the query string
        let body = response.bytes_stream().map_err(reqwest::Error::without_url);
        let mut chunks = Box::pin(decode_sse(body, decoder));
        while let Some(chunk) = chunks.next().await {
            yield chunk?;
        }
    }
}

/// End `stream` as soon as `token` is cancelled.
///
/// The pending read is dropped, which aborts the underlying body transfer.
pub fn cancellable(stream: ChunkStream, token: CancellationToken) -> ChunkStream {
    Box::pin(stream.take_until(token.cancelled_owned()))
}

// --- OpenAI-compatible ---

#[derive(Debug, Deserialize)]
struct OpenAIChunk {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    delta: Option<OpenAIDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

/// `data: {choices:[{delta:{content}}]}` lines, ended by `data: [DONE]`
#[derive(Debug, Default)]
pub struct OpenAIDecoder;

impl SseDecoder for OpenAIDecoder {
    fn decode_line(&mut self, line: &str) -> LineEvent {
        let Some(payload) = data_payload(line) else {
            return LineEvent::Skip;
        };
        if payload == "[DONE]" {
            return LineEvent::Done;
        }

        decode_payload::<OpenAIChunk>(payload, "openai")
            .and_then(|chunk| chunk.choices.into_iter().next())
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|text| !text.is_empty())
            .map_or(LineEvent::Skip, LineEvent::Text)
    }
}

// --- Anthropic ---

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: AnthropicDelta },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

/// Paired `event:` / `data:` lines; text only under `content_block_delta`,
/// stops at `event: message_stop`.
#[derive(Debug, Default)]
pub struct AnthropicDecoder {
    pending_event: Option<String>,
}

impl SseDecoder for AnthropicDecoder {
    fn decode_line(&mut self, line: &str) -> LineEvent {
        if let Some(name) = line.strip_prefix("event:") {
            let name = name.trim();
            if name == "message_stop" {
                return LineEvent::Done;
            }
            self.pending_event = Some(name.to_string());
            return LineEvent::Skip;
        }

        let Some(payload) = data_payload(line) else {
            return LineEvent::Skip;
        };

        match self.pending_event.as_deref() {
            Some("content_block_delta") => {
                match decode_payload::<AnthropicEvent>(payload, "anthropic") {
                    Some(AnthropicEvent::ContentBlockDelta {
                        delta: AnthropicDelta::TextDelta { text },
                    }) => LineEvent::Text(text),
                    _ => LineEvent::Skip,
                }
            }
            Some("error") => {
                tracing::warn!(payload, "Anthropic stream reported an error event");
                LineEvent::Fail(LlmError::InvalidResponse)
            }
            _ => LineEvent::Skip,
        }
    }
}

// --- Gemini ---

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiCandidate {
    pub content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiPart {
    pub text: Option<String>,
}

impl GeminiResponse {
    /// `candidates[0].content.parts[0].text`
    pub(crate) fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
    }
}

/// Independent `data:` lines in the buffered response shape; no sentinel
#[derive(Debug, Default)]
pub struct GeminiDecoder;

impl SseDecoder for GeminiDecoder {
    fn decode_line(&mut self, line: &str) -> LineEvent {
        data_payload(line)
            .and_then(|payload| decode_payload::<GeminiResponse>(payload, "gemini"))
            .and_then(GeminiResponse::first_text)
            .filter(|text| !text.is_empty())
            .map_or(LineEvent::Skip, LineEvent::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn bytes_of(parts: &[&str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        let items: Vec<Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        stream::iter(items)
    }

    async fn collect<D: SseDecoder>(parts: &[&str], decoder: D) -> Result<Vec<String>, LlmError> {
        Box::pin(decode_sse(bytes_of(parts), decoder)).try_collect().await
    }

    // --- Line buffer ---

    #[test]
    fn test_line_buffer_split_and_crlf() {
        let mut buf = LineBuffer::default();
        buf.push(b"data: one\r\nda").unwrap();
        assert_eq!(buf.next_line().as_deref(), Some("data: one"));
        assert_eq!(buf.next_line(), None);
        buf.push(b"ta: two\n").unwrap();
        assert_eq!(buf.next_line().as_deref(), Some("data: two"));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_line_buffer_utf8_split_across_chunks() {
        let text = "data: héllo\n".as_bytes();
        // split inside the two-byte 'é'
        let (a, b) = text.split_at(8);
        let mut buf = LineBuffer::default();
        buf.push(a).unwrap();
        assert_eq!(buf.next_line(), None);
        buf.push(b).unwrap();
        assert_eq!(buf.next_line().as_deref(), Some("data: héllo"));
    }

    #[test]
    fn test_line_buffer_limit() {
        let mut buf = LineBuffer::default();
        let big = vec![b'a'; MAX_LINE_BUFFER + 1];
        assert_eq!(buf.push(&big), Err(LlmError::InvalidResponse));
    }

    #[test]
    fn test_line_buffer_finish_returns_tail() {
        let mut buf = LineBuffer::default();
        buf.push(b"data: tail").unwrap();
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.finish().as_deref(), Some("data: tail"));
    }

    // --- OpenAI ---

    #[test]
    fn test_openai_text_delta() {
        let mut d = OpenAIDecoder;
        let line = r#"data: {"id":"chatcmpl-1","choices":[{"index":0,"delta":{"content":"Hi"}}]}"#;
        assert_eq!(d.decode_line(line), LineEvent::Text("Hi".into()));
    }

    #[test]
    fn test_openai_done_and_noise() {
        let mut d = OpenAIDecoder;
        assert_eq!(d.decode_line("data: [DONE]"), LineEvent::Done);
        assert_eq!(d.decode_line(": keep-alive"), LineEvent::Skip);
        assert_eq!(d.decode_line("data: {not json"), LineEvent::Skip);
        assert_eq!(
            d.decode_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            LineEvent::Skip
        );
        assert_eq!(d.decode_line(r#"data: {"choices":[]}"#), LineEvent::Skip);
    }

    #[tokio::test]
    async fn test_openai_stream_two_chunks_then_done() {
        let chunks = collect(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
                "data: [DONE]\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
            ],
            OpenAIDecoder,
        )
        .await
        .unwrap();
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_openai_stream_skips_malformed_line() {
        let chunks = collect(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
                "data: {broken\n",
                ": comment\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
                "data: [DONE]\n",
            ],
            OpenAIDecoder,
        )
        .await
        .unwrap();
        assert_eq!(chunks, vec!["a", "b"]);
    }

    // --- Anthropic ---

    #[tokio::test]
    async fn test_anthropic_single_delta_then_stop() {
        let chunks = collect(
            &[
                "event: content_block_delta\n",
                "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
                "event: message_stop\n",
                "data: {\"type\":\"message_stop\"}\n\n",
            ],
            AnthropicDecoder::default(),
        )
        .await
        .unwrap();
        assert_eq!(chunks, vec!["Hi"]);
    }

    #[test]
    fn test_anthropic_ignores_data_under_other_events() {
        let mut d = AnthropicDecoder::default();
        assert_eq!(d.decode_line("event: message_start"), LineEvent::Skip);
        assert_eq!(
            d.decode_line(r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"x"}}"#),
            LineEvent::Skip
        );
        assert_eq!(d.decode_line("event: ping"), LineEvent::Skip);
        assert_eq!(d.decode_line(r#"data: {"type":"ping"}"#), LineEvent::Skip);
    }

    #[test]
    fn test_anthropic_non_text_delta_skipped() {
        let mut d = AnthropicDecoder::default();
        d.decode_line("event: content_block_delta");
        let line = r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{"}}"#;
        assert_eq!(d.decode_line(line), LineEvent::Skip);
    }

    #[test]
    fn test_anthropic_error_event_fails() {
        let mut d = AnthropicDecoder::default();
        d.decode_line("event: error");
        let line = r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(d.decode_line(line), LineEvent::Fail(LlmError::InvalidResponse));
    }

    #[tokio::test]
    async fn test_anthropic_stream_error_surfaces() {
        let result = collect(
            &[
                "event: content_block_delta\n",
                "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"partial\"}}\n",
                "event: error\n",
                "data: {\"type\":\"error\"}\n",
            ],
            AnthropicDecoder::default(),
        )
        .await;
        assert_eq!(result, Err(LlmError::InvalidResponse));
    }

    // --- Gemini ---

    #[test]
    fn test_gemini_text_delta() {
        let mut d = GeminiDecoder;
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hello"}],"role":"model"}}]}"#;
        assert_eq!(d.decode_line(line), LineEvent::Text("Hello".into()));
    }

    #[test]
    fn test_gemini_empty_candidates() {
        let mut d = GeminiDecoder;
        assert_eq!(d.decode_line(r#"data: {"candidates":[]}"#), LineEvent::Skip);
        assert_eq!(d.decode_line(r#"data: {"usageMetadata":{}}"#), LineEvent::Skip);
    }

    #[tokio::test]
    async fn test_gemini_stream_until_close() {
        let chunks = collect(
            &[
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"A\"}]}}]}\r\n\r\n",
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"B\"}]},\"finishReason\":\"STOP\"}]}",
            ],
            GeminiDecoder,
        )
        .await
        .unwrap();
        assert_eq!(chunks, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_cancellable_stops_stream() {
        let token = CancellationToken::new();
        token.cancel();
        let inner: ChunkStream = Box::pin(stream::iter(vec![Ok("never".to_string())]));
        let out: Vec<_> = cancellable(inner, token).collect().await;
        assert!(out.is_empty());
    }
}
