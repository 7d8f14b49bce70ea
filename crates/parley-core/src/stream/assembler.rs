//! Incremental reconstruction of one streamed answer.
//!
//! [`ResponseAssembler`] is a pure state machine: it never touches the network
//! or a timer, so every transition can be driven from tests with literal
//! chunks.
//!
//! ```text
//! Idle ──first chunk──▶ Streaming ──finish()──▶ Complete
//!                           │
//!                           └──Error chunk / protocol violation──▶ Failed
//! ```

use super::chunk::{ChunkKind, ChunkMessage, StreamChunk, TokenCounters};
use crate::error::{ParleyError, Result};
use crate::record::ChatResponse;
use serde::Serialize;
use strum::Display;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AssemblerState {
    #[default]
    Idle,
    Streaming,
    Complete,
    Failed,
}

impl AssemblerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// What the UI renders while (and after) a response streams in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamSnapshot {
    pub state: AssemblerState,
    pub answer: String,
    pub tokens: u32,
    pub user_tokens: u32,
    pub error: Option<String>,
}

/// The final answer of a successful stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssembledResponse {
    pub answer: String,
    pub tokens: u32,
    pub user_tokens: u32,
}

impl From<AssembledResponse> for ChatResponse {
    fn from(response: AssembledResponse) -> Self {
        ChatResponse::new(response.answer, response.tokens, response.user_tokens)
    }
}

#[derive(Debug, Default)]
pub struct ResponseAssembler {
    state: AssemblerState,
    buffer: String,
    counters: TokenCounters,
    last_order: Option<u64>,
    error: Option<String>,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            state: self.state,
            answer: self.buffer.clone(),
            tokens: self.counters.streamed_tokens,
            user_tokens: self.counters.request_tokens,
            error: self.error.clone(),
        }
    }

    /// Applies one decoded chunk.
    ///
    /// Returns `Err` once the response has failed; the caller must stop feeding
    /// chunks and surface the error.
    pub fn accept(&mut self, chunk: StreamChunk) -> Result<()> {
        match self.state {
            AssemblerState::Failed => return Err(self.failure()),
            AssemblerState::Complete => {
                return Err(self.fail("chunk received after the response completed"));
            }
            AssemblerState::Idle => self.state = AssemblerState::Streaming,
            AssemblerState::Streaming => {}
        }

        if let Some(last) = self.last_order.filter(|last| chunk.order < *last) {
            return Err(self.fail(format!(
                "chunk order went backwards: {} after {}",
                chunk.order, last
            )));
        }
        self.last_order = Some(chunk.order);

        match (chunk.kind, chunk.message) {
            (ChunkKind::Content, ChunkMessage::Text(text)) => {
                self.buffer.push_str(&text);
                Ok(())
            }
            (ChunkKind::Info, ChunkMessage::Tokens(counters)) => {
                debug!(
                    order = chunk.order,
                    request_tokens = counters.request_tokens,
                    streamed_tokens = counters.streamed_tokens,
                    "Token counters updated"
                );
                self.counters = counters;
                Ok(())
            }
            (ChunkKind::Error, ChunkMessage::Text(text)) => Err(self.fail(text)),
            (ChunkKind::Error, ChunkMessage::Tokens(counters)) => Err(self.fail(format!(
                "backend error (requesttokens={}, streamedtokens={})",
                counters.request_tokens, counters.streamed_tokens
            ))),
            (ChunkKind::Error, ChunkMessage::Other(value)) => Err(self.fail(value.to_string())),
            (kind, message) => Err(self.fail(format!(
                "malformed chunk at order {}: {:?} with {:?}",
                chunk.order, kind, message
            ))),
        }
    }

    /// Decodes and applies one complete NDJSON line. Blank lines are skipped.
    pub fn accept_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        match StreamChunk::parse(line) {
            Ok(chunk) => self.accept(chunk),
            Err(e) => Err(self.fail(format!("malformed chunk: {e}"))),
        }
    }

    /// Applies the unterminated fragment left when the stream closed.
    ///
    /// A fragment that does not decode was cut off in transit and is dropped.
    pub fn accept_truncated(&mut self, fragment: &str) -> Result<()> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(());
        }
        match StreamChunk::parse(fragment) {
            Ok(chunk) => self.accept(chunk),
            Err(e) => {
                warn!(
                    error = %e,
                    bytes = fragment.len(),
                    "Dropping truncated trailing chunk"
                );
                Ok(())
            }
        }
    }

    /// Closes the stream.
    ///
    /// Succeeds only if at least one chunk arrived and no error was seen.
    pub fn finish(&mut self) -> Result<AssembledResponse> {
        match self.state {
            AssemblerState::Failed => Err(self.failure()),
            AssemblerState::Idle => Err(self.fail("stream closed before any chunk arrived")),
            AssemblerState::Streaming | AssemblerState::Complete => {
                self.state = AssemblerState::Complete;
                Ok(AssembledResponse {
                    answer: self.buffer.clone(),
                    tokens: self.counters.streamed_tokens,
                    user_tokens: self.counters.request_tokens,
                })
            }
        }
    }

    /// Marks the response failed for a reason outside the chunk protocol,
    /// such as a broken connection.
    pub fn abort(&mut self, error: ParleyError) -> ParleyError {
        warn!(error = %error, "Stream aborted");
        self.state = AssemblerState::Failed;
        self.error = Some(error.to_string());
        error
    }

    fn fail(&mut self, message: impl Into<String>) -> ParleyError {
        let message = message.into();
        warn!(error = %message, "Stream failed");
        self.state = AssemblerState::Failed;
        self.error = Some(message);
        self.failure()
    }

    fn failure(&self) -> ParleyError {
        ParleyError::stream(self.error.clone().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(chunks: Vec<StreamChunk>) -> (ResponseAssembler, Result<AssembledResponse>) {
        let mut assembler = ResponseAssembler::new();
        for chunk in chunks {
            if let Err(e) = assembler.accept(chunk) {
                return (assembler, Err(e));
            }
        }
        let result = assembler.finish();
        (assembler, result)
    }

    #[test]
    fn test_reassembles_content_and_counters() {
        let (assembler, result) = feed(vec![
            StreamChunk::content("Hel", 0),
            StreamChunk::content("lo", 1),
            StreamChunk::info(5, 2, 2),
        ]);

        assert_eq!(
            result.unwrap(),
            AssembledResponse {
                answer: "Hello".to_string(),
                tokens: 2,
                user_tokens: 5,
            }
        );
        assert_eq!(assembler.state(), AssemblerState::Complete);
    }

    #[test]
    fn test_error_chunk_short_circuits() {
        let (assembler, result) = feed(vec![
            StreamChunk::content("Hel", 0),
            StreamChunk::error("boom", 1),
        ]);

        let err = result.unwrap_err();
        assert!(err.is_stream());
        assert_eq!(err.to_string(), "Stream error: boom");
        assert_eq!(assembler.state(), AssemblerState::Failed);

        // The partial answer stays visible but finish() keeps failing.
        let mut assembler = assembler;
        assert_eq!(assembler.snapshot().answer, "Hel");
        assert!(assembler.finish().is_err());
    }

    #[test]
    fn test_info_counters_overwrite() {
        let (_, result) = feed(vec![
            StreamChunk::info(5, 1, 0),
            StreamChunk::content("a", 1),
            StreamChunk::info(5, 4, 2),
        ]);
        let response = result.unwrap();
        assert_eq!(response.tokens, 4);
        assert_eq!(response.user_tokens, 5);
    }

    #[test]
    fn test_decreasing_order_fails() {
        let (assembler, result) = feed(vec![
            StreamChunk::content("a", 2),
            StreamChunk::content("b", 1),
        ]);
        assert!(result.is_err());
        assert_eq!(assembler.state(), AssemblerState::Failed);
    }

    #[test]
    fn test_equal_order_is_allowed() {
        let (_, result) = feed(vec![
            StreamChunk::content("a", 1),
            StreamChunk::content("b", 1),
        ]);
        assert_eq!(result.unwrap().answer, "ab");
    }

    #[test]
    fn test_empty_stream_fails() {
        let mut assembler = ResponseAssembler::new();
        assert_eq!(assembler.state(), AssemblerState::Idle);
        assert!(assembler.finish().is_err());
    }

    #[test]
    fn test_kind_and_message_mismatch_is_malformed() {
        let mut assembler = ResponseAssembler::new();
        let err = assembler
            .accept_line(r#"{"type":"C","message":{"requesttokens":1,"streamedtokens":1},"order":0}"#)
            .unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }

    #[test]
    fn test_complete_malformed_line_fails_but_truncated_fragment_is_dropped() {
        let mut assembler = ResponseAssembler::new();
        assembler
            .accept_line(r#"{"type":"C","message":"ok","order":0}"#)
            .unwrap();
        assembler.accept_truncated(r#"{"type":"C","mess"#).unwrap();
        assert_eq!(assembler.finish().unwrap().answer, "ok");

        let mut assembler = ResponseAssembler::new();
        assert!(assembler.accept_line(r#"{"type":"C","mess"#).is_err());
    }

    #[test]
    fn test_snapshot_tracks_progress() {
        let mut assembler = ResponseAssembler::new();
        assembler.accept(StreamChunk::content("Hi", 0)).unwrap();
        let snapshot = assembler.snapshot();
        assert_eq!(snapshot.state, AssemblerState::Streaming);
        assert_eq!(snapshot.answer, "Hi");
        assert_eq!(snapshot.error, None);
    }
}
