use std::pin::Pin;
use std::task::{Context, Poll};

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde_json::Value;

use super::types::StreamChunk;
use crate::error::AiServiceError;

const DONE_SENTINEL: &str = "[DONE]";

/// Incremental server-sent-events decoder. Bytes may be split anywhere,
/// including inside a UTF-8 sequence or a `\r\n` pair.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed raw bytes, returning the data payload of every event completed
    /// by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if let Some(rest) = line.strip_prefix("data:") {
                self.data
                    .push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
            // comments (":") and other fields are ignored
        }
        events
    }

    /// Flush an event left unterminated when the connection closed.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&rest);
            let line = line.trim_end_matches('\r');
            if let Some(data) = line.strip_prefix("data:") {
                self.data
                    .push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }
        if self.data.is_empty() {
            None
        } else {
            let event = self.data.join("\n");
            self.data.clear();
            Some(event)
        }
    }
}

#[derive(Debug, PartialEq)]
enum SsePayload {
    Done,
    Data {
        delta: Option<String>,
        finish_reason: Option<String>,
    },
}

fn parse_payload(payload: &str) -> Result<SsePayload, AiServiceError> {
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Ok(SsePayload::Done);
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        // keep-alive noise from some providers
        Err(_) => {
            return Ok(SsePayload::Data {
                delta: None,
                finish_reason: None,
            })
        }
    };

    if let Some(message) = provider_error_message(&value) {
        return Err(AiServiceError::provider(None, message));
    }

    let choice = value.get("choices").and_then(|c| c.get(0));
    let delta = choice
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let finish_reason = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(SsePayload::Data {
        delta,
        finish_reason,
    })
}

/// `{"error": {"message": ..}}` or `{"error": ".."}` in a response body.
pub(crate) fn provider_error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    if let Some(msg) = error.get("message").and_then(|m| m.as_str()) {
        return Some(msg.to_string());
    }
    error.as_str().map(str::to_string)
}

type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, AiServiceError>> + Send>>;

/// A finite, non-restartable sequence of completion chunks. Ends after a
/// single `StreamChunk::Done`. Dropping it closes the underlying
/// connection.
pub struct ChatStream {
    inner: ChunkStream,
}

impl ChatStream {
    pub fn new(inner: ChunkStream) -> Self {
        Self { inner }
    }

    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        Self::new(Box::pin(sse_chunks(response.bytes_stream())))
    }

    /// A stream over pre-computed chunks, used by scripted providers.
    pub fn from_chunks(chunks: Vec<Result<StreamChunk, AiServiceError>>) -> Self {
        Self::new(Box::pin(futures::stream::iter(chunks)))
    }

    /// Drain the stream and concatenate every delta.
    pub async fn collect_text(mut self) -> Result<String, AiServiceError> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            match chunk? {
                StreamChunk::Delta(delta) => text.push_str(&delta),
                StreamChunk::Done { .. } => break,
            }
        }
        Ok(text)
    }
}

impl Stream for ChatStream {
    type Item = Result<StreamChunk, AiServiceError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream").finish_non_exhaustive()
    }
}

fn sse_chunks<S, B>(bytes: S) -> impl Stream<Item = Result<StreamChunk, AiServiceError>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = SseDecoder::default();
        let mut finish_reason: Option<String> = None;
        let mut done = false;

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(AiServiceError::from_reqwest)?;
            for payload in decoder.push(chunk.as_ref()) {
                match parse_payload(&payload)? {
                    SsePayload::Done => {
                        done = true;
                        break 'read;
                    }
                    SsePayload::Data { delta, finish_reason: reason } => {
                        if reason.is_some() {
                            finish_reason = reason;
                        }
                        if let Some(delta) = delta {
                            yield StreamChunk::Delta(delta);
                        }
                    }
                }
            }
        }

        if !done {
            if let Some(payload) = decoder.finish() {
                if let SsePayload::Data { delta, finish_reason: reason } = parse_payload(&payload)? {
                    if reason.is_some() {
                        finish_reason = reason;
                    }
                    if let Some(delta) = delta {
                        yield StreamChunk::Delta(delta);
                    }
                }
            }
        }

        yield StreamChunk::Done { finish_reason };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn decoder_handles_split_frames_and_crlf() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert!(decoder.push(b":1}\r").is_empty());
        let events = decoder.push(b"\n\r\n: keep-alive\n\ndata: [DONE]\n\n");
        assert_eq!(events, vec!["{\"a\":1}".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn decoder_handles_split_utf8() {
        let bytes = "data: héllo\n\n".as_bytes();
        let mut decoder = SseDecoder::default();
        // split inside the two-byte 'é'
        assert!(decoder.push(&bytes[..8]).is_empty());
        assert_eq!(decoder.push(&bytes[8..]), vec!["héllo".to_string()]);
    }

    #[test]
    fn parse_error_payload() {
        let err = parse_payload(r#"{"error":{"message":"overloaded"}}"#).unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn chunks_stop_at_sentinel() {
        let body = format!(
            "{}{}data: {}\n\ndata: [DONE]\n\n{}",
            frame("Hel"),
            frame("lo"),
            serde_json::json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
            frame("ignored"),
        );
        let source = futures::stream::iter(vec![Ok::<_, reqwest::Error>(body.into_bytes())]);
        let chunks: Vec<_> = sse_chunks(source).collect().await;
        let chunks: Vec<StreamChunk> = chunks.into_iter().map(|c| c.unwrap()).collect();

        assert_eq!(
            chunks,
            vec![
                StreamChunk::Delta("Hel".into()),
                StreamChunk::Delta("lo".into()),
                StreamChunk::Done {
                    finish_reason: Some("stop".into())
                },
            ]
        );
    }

    #[test]
    fn connection_close_ends_stream() {
        let source = futures::stream::iter(vec![Ok::<_, reqwest::Error>(
            frame("partial").into_bytes(),
        )]);
        let text =
            tokio_test::block_on(ChatStream::new(Box::pin(sse_chunks(source))).collect_text())
                .unwrap();
        assert_eq!(text, "partial");
    }
}
