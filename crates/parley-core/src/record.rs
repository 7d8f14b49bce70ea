//! Persisted record shapes.
//!
//! A collection stores [`DbObject`] documents. Each document owns an
//! append-ordered list of [`DbMessage`]s whose `response` payload depends on
//! the feature that owns the collection (chat, summarize, brainstorm, ...).

use serde::{Deserialize, Serialize};

/// Wall-clock milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// One user turn and the response it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbMessage<R> {
    pub user: String,
    pub response: R,
}

impl<R> DbMessage<R> {
    pub fn new(user: impl Into<String>, response: R) -> Self {
        Self {
            user: user.into(),
            response,
        }
    }
}

/// A persisted session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbObject<R, C> {
    pub id: String,
    pub messages: Vec<DbMessage<R>>,
    pub config: C,
    pub last_edited: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
    /// Incremented on every write; only consulted by checked updates.
    #[serde(default)]
    pub rev: u64,
}

impl<R, C> DbObject<R, C> {
    /// Returns the session name, or `placeholder` when none was set.
    pub fn display_name<'a>(&'a self, placeholder: &'a str) -> &'a str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => placeholder,
        }
    }

    pub fn is_favorite(&self) -> bool {
        self.favorite.unwrap_or(false)
    }
}

impl<R: TokenUsage, C> DbObject<R, C> {
    /// Sum of prompt and response tokens across every message.
    pub fn total_tokens(&self) -> u64 {
        self.messages
            .iter()
            .map(|m| u64::from(m.response.user_tokens()) + u64::from(m.response.tokens()))
            .sum()
    }
}

/// Token accounting exposed by response payloads.
pub trait TokenUsage {
    /// Tokens produced by the model.
    fn tokens(&self) -> u32;

    /// Tokens consumed by the prompt.
    fn user_tokens(&self) -> u32;

    /// True for the empty answer shown while a stream is still in flight.
    fn is_placeholder(&self) -> bool;
}

/// Answer to a plain chat question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    pub tokens: u32,
    #[serde(default)]
    pub user_tokens: u32,
}

impl ChatResponse {
    pub fn new(answer: impl Into<String>, tokens: u32, user_tokens: u32) -> Self {
        Self {
            answer: answer.into(),
            tokens,
            user_tokens,
        }
    }

    /// The in-flight placeholder.
    pub fn placeholder() -> Self {
        Self::default()
    }
}

impl TokenUsage for ChatResponse {
    fn tokens(&self) -> u32 {
        self.tokens
    }

    fn user_tokens(&self) -> u32 {
        self.user_tokens
    }

    fn is_placeholder(&self) -> bool {
        self.answer.is_empty()
    }
}

/// One summarization request can yield several candidate summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub answers: Vec<String>,
    #[serde(default)]
    pub tokens: u32,
    #[serde(default)]
    pub user_tokens: u32,
}

impl TokenUsage for SummaryResponse {
    fn tokens(&self) -> u32 {
        self.tokens
    }

    fn user_tokens(&self) -> u32 {
        self.user_tokens
    }

    fn is_placeholder(&self) -> bool {
        self.answers.iter().all(|a| a.is_empty())
    }
}

/// Markdown outline rendered as a mind map by the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MindMapResponse {
    pub markdown: String,
    #[serde(default)]
    pub tokens: u32,
    #[serde(default)]
    pub user_tokens: u32,
}

impl TokenUsage for MindMapResponse {
    fn tokens(&self) -> u32 {
        self.tokens
    }

    fn user_tokens(&self) -> u32 {
        self.user_tokens
    }

    fn is_placeholder(&self) -> bool {
        self.markdown.trim().is_empty()
    }
}

/// Per-session request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            model_id: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Settings of a custom assistant; stored once per owner id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub session: SessionConfig,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "Assistant".to_string(),
            description: String::new(),
            session: SessionConfig::default(),
        }
    }
}
