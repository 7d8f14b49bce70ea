//! Wire format of the streaming chat endpoint.
//!
//! The backend writes one JSON object per line:
//!
//! ```text
//! {"type":"C","message":"Hel","order":0}
//! {"type":"C","message":"lo","order":1}
//! {"type":"I","message":{"requesttokens":5,"streamedtokens":2},"order":2}
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkKind {
    /// A fragment of answer text.
    #[serde(rename = "C")]
    Content,
    /// Cumulative token counters.
    #[serde(rename = "I")]
    Info,
    /// The backend aborted the response.
    #[serde(rename = "E")]
    Error,
}

/// Token counters reported by an Info chunk. Both values are cumulative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounters {
    #[serde(rename = "requesttokens")]
    pub request_tokens: u32,
    #[serde(rename = "streamedtokens")]
    pub streamed_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkMessage {
    Text(String),
    Tokens(TokenCounters),
    /// Any other JSON payload; only meaningful on Error chunks.
    Other(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    pub message: ChunkMessage,
    #[serde(default)]
    pub order: u64,
}

impl StreamChunk {
    pub fn content(text: impl Into<String>, order: u64) -> Self {
        Self {
            kind: ChunkKind::Content,
            message: ChunkMessage::Text(text.into()),
            order,
        }
    }

    pub fn info(request_tokens: u32, streamed_tokens: u32, order: u64) -> Self {
        Self {
            kind: ChunkKind::Info,
            message: ChunkMessage::Tokens(TokenCounters {
                request_tokens,
                streamed_tokens,
            }),
            order,
        }
    }

    pub fn error(text: impl Into<String>, order: u64) -> Self {
        Self {
            kind: ChunkKind::Error,
            message: ChunkMessage::Text(text.into()),
            order,
        }
    }

    /// Parses one NDJSON line.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}
