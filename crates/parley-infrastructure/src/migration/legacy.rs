//! Shapes chat records have had on disk.
//!
//! Version 1 of the chat collection stored each exchange as a positional
//! array under `Answers`:
//!
//! ```json
//! {"id": "abc", "Answers": [["question", "answer", 42]], "lastEdited": 1700000000000}
//! ```
//!
//! Version 2 is the current [`DbObject`] layout.

use parley_core::record::{ChatResponse, DbMessage, DbObject, SessionConfig, Timestamp};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::Deserialize;
use std::fmt;

pub type ChatRecord = DbObject<ChatResponse, SessionConfig>;

/// Every chat record shape that can be found on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LegacyChatRecord {
    Current(ChatRecord),
    AnswersV1(AnswersV1Record),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswersV1Record {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "Answers")]
    pub answers: Vec<LegacyAnswer>,
    #[serde(rename = "lastEdited", default)]
    pub last_edited: Option<Timestamp>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub favorite: Option<bool>,
    #[serde(default)]
    pub config: Option<SessionConfig>,
}

/// `[user, answer]` or `[user, answer, tokens]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyAnswer {
    pub user: String,
    pub answer: String,
    pub tokens: u32,
}

impl<'de> Deserialize<'de> for LegacyAnswer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TupleVisitor;

        impl<'de> Visitor<'de> for TupleVisitor {
            type Value = LegacyAnswer;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array [user, answer] or [user, answer, tokens]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<LegacyAnswer, A::Error> {
                let user: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let answer: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let tokens: Option<u32> = seq.next_element()?;
                if seq.next_element::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(4, &self));
                }
                Ok(LegacyAnswer {
                    user,
                    answer,
                    tokens: tokens.unwrap_or(0),
                })
            }
        }

        deserializer.deserialize_seq(TupleVisitor)
    }
}

impl LegacyChatRecord {
    /// Converts any known shape into the current record.
    ///
    /// `row_id` is used when the legacy body carries no id of its own.
    /// Exchanges with an empty question are dropped, since persisted
    /// messages must have a user turn. A missing timestamp becomes 0 so the
    /// record sorts as the oldest session.
    pub fn into_current(self, row_id: &str) -> ChatRecord {
        match self {
            Self::Current(record) => record,
            Self::AnswersV1(legacy) => DbObject {
                id: legacy.id.unwrap_or_else(|| row_id.to_string()),
                messages: legacy
                    .answers
                    .into_iter()
                    .filter(|a| !a.user.trim().is_empty())
                    .map(|a| DbMessage::new(a.user, ChatResponse::new(a.answer, a.tokens, 0)))
                    .collect(),
                config: legacy.config.unwrap_or_default(),
                last_edited: legacy.last_edited.unwrap_or(0),
                name: legacy.name,
                favorite: legacy.favorite,
                rev: 1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_both_tuple_lengths() {
        let legacy: LegacyChatRecord = serde_json::from_value(json!({
            "id": "abc",
            "Answers": [["hi", "hello", 7], ["more", "sure"]],
            "lastEdited": 99
        }))
        .unwrap();

        let record = legacy.into_current("row");
        assert_eq!(record.id, "abc");
        assert_eq!(record.last_edited, 99);
        assert_eq!(
            record.messages,
            vec![
                DbMessage::new("hi", ChatResponse::new("hello", 7, 0)),
                DbMessage::new("more", ChatResponse::new("sure", 0, 0)),
            ]
        );
    }

    #[test]
    fn test_current_shape_passes_through() {
        let value = json!({
            "id": "s1",
            "messages": [{"user": "q", "response": {"answer": "a", "tokens": 1, "userTokens": 2}}],
            "config": {"systemPrompt": "be brief"},
            "lastEdited": 5
        });
        let legacy: LegacyChatRecord = serde_json::from_value(value).unwrap();
        assert!(matches!(legacy, LegacyChatRecord::Current(_)));
        assert_eq!(legacy.into_current("ignored").config.system_prompt, "be brief");
    }

    #[test]
    fn test_rejects_oversized_tuples_and_unknown_shapes() {
        assert!(serde_json::from_value::<LegacyChatRecord>(json!({
            "Answers": [["a", "b", 1, "extra"]]
        }))
        .is_err());
        assert!(serde_json::from_value::<LegacyChatRecord>(json!({"foo": 1})).is_err());
    }

    #[test]
    fn test_missing_id_and_empty_questions() {
        let legacy: LegacyChatRecord = serde_json::from_value(json!({
            "Answers": [["", "orphan"], ["q", "a"]]
        }))
        .unwrap();
        let record = legacy.into_current("row-7");
        assert_eq!(record.id, "row-7");
        assert_eq!(record.messages.len(), 1);
        assert_eq!(record.last_edited, 0);
    }
}
