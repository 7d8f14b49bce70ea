//! The network seam between a conversation and the chat backend.

use crate::error::Result;
use crate::record::SessionConfig;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Raw body chunks of a streamed reply.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// One question sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    pub system_prompt: String,
    pub model_id: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the backend for an NDJSON chunk stream instead of one document.
    pub stream: bool,
}

impl ChatRequest {
    /// Builds a request from a session's settings.
    pub fn from_session(question: impl Into<String>, config: &SessionConfig, stream: bool) -> Self {
        Self {
            question: question.into(),
            system_prompt: config.system_prompt.clone(),
            model_id: config.model_id.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream,
        }
    }
}

pub enum TransportResponse {
    Streamed(ByteStream),
    Complete { status: u16, body: String },
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Streamed(_) => f.write_str("Streamed(..)"),
            Self::Complete { status, body } => f
                .debug_struct("Complete")
                .field("status", status)
                .field("body", body)
                .finish(),
        }
    }
}

/// Sends a [`ChatRequest`] to the backend.
///
/// Implementations return `Streamed` only when the request asked for
/// streaming and the backend answered with a 2xx status; every other reply
/// is read in full and returned as `Complete`.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse>;
}
