//! Error types for the Parley crates.

use serde::Serialize;
use thiserror::Error;

/// A shared error type for the whole workspace.
///
/// Store operations, migrations and the streaming pipeline all report
/// through this enum so that callers can branch on the variant instead of
/// parsing messages.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ParleyError {
    /// A record referenced by id is absent from its collection
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// `create` was asked to insert an id that already exists
    #[error("Duplicate id: '{id}' already exists")]
    DuplicateId { id: String },

    /// The embedded database failed to open or upgrade
    #[error("Connection error: {0}")]
    Connection(String),

    /// A schema migration step failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Statement-level database failure on an open connection
    #[error("Database error: {0}")]
    Database(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A record or argument violates a record invariant
    #[error("Invalid record: {0}")]
    Invalid(String),

    /// Optimistic revision check failed
    #[error("Stale revision for '{id}': expected {expected}, found {actual}")]
    StaleRevision {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// Error chunk, malformed chunk or broken stream
    #[error("Stream error: {0}")]
    Stream(String),

    /// Non-2xx status or an `error` field in a complete response
    #[error("Request failed (status {status}): {message}")]
    RequestFailed { status: u16, message: String },

    /// The driving side abandoned the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId { id: id.into() }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration(message.into())
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Creates a JSON serialization error
    pub fn json(message: impl Into<String>) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    pub fn request_failed(status: u16, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_duplicate_id(&self) -> bool {
        matches!(self, Self::DuplicateId { .. })
    }

    /// True when the store itself is unreachable, as opposed to a missing record.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_) | Self::RequestFailed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for ParleyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ParleyError {
    fn from(err: serde_json::Error) -> Self {
        Self::json(err.to_string())
    }
}

impl From<toml::de::Error> for ParleyError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ParleyError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ParleyError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{:#}", err))
    }
}

/// A type alias for `Result<T, ParleyError>`.
pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(ParleyError::not_found("Session", "abc").is_not_found());
        assert!(ParleyError::duplicate_id("abc").is_duplicate_id());
        assert!(ParleyError::connection("locked").is_connection());
        assert!(ParleyError::stream("boom").is_stream());
        assert!(ParleyError::request_failed(500, "down").is_stream());
        assert!(!ParleyError::Cancelled.is_stream());
    }

    #[test]
    fn test_display_includes_context() {
        let err = ParleyError::not_found("Session", "s-1");
        assert_eq!(err.to_string(), "Entity not found: Session 's-1'");

        let err = ParleyError::StaleRevision {
            id: "s-1".to_string(),
            expected: 2,
            actual: 3,
        };
        assert!(err.to_string().contains("expected 2, found 3"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let err: ParleyError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ParleyError::Serialization { ref format, .. } if format == "JSON"));
    }
}
