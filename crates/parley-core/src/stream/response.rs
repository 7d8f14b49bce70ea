//! Non-streaming responses: one JSON document per request.

use super::assembler::AssembledResponse;
use crate::error::{ParleyError, Result};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct CompleteBody {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    tokens: Option<u32>,
    #[serde(default)]
    user_tokens: Option<u32>,
    #[serde(default)]
    error: Option<Value>,
}

/// Parses the body of a non-streaming reply.
///
/// A status outside `200..=299` or a truthy `error` field is a request
/// failure.
pub fn parse_complete_response(status: u16, body: &str) -> Result<AssembledResponse> {
    if !(200..=299).contains(&status) {
        let message = serde_json::from_str::<CompleteBody>(body)
            .ok()
            .and_then(|b| b.error.filter(is_truthy))
            .map(|e| error_text(&e))
            .unwrap_or_else(|| body.trim().to_string());
        return Err(ParleyError::request_failed(status, message));
    }

    let parsed: CompleteBody = serde_json::from_str(body)
        .map_err(|e| ParleyError::stream(format!("malformed response body: {e}")))?;

    if let Some(error) = parsed.error.as_ref().filter(|e| is_truthy(e)) {
        return Err(ParleyError::request_failed(status, error_text(error)));
    }

    let answer = parsed
        .answer
        .ok_or_else(|| ParleyError::stream("response body has no answer"))?;

    Ok(AssembledResponse {
        answer,
        tokens: parsed.tokens.unwrap_or(0),
        user_tokens: parsed.user_tokens.unwrap_or(0),
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn error_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
