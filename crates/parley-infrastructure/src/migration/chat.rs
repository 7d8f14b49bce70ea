//! Chat collection: tuple-array answers (v1) to message records (v2).

use super::legacy::LegacyChatRecord;
use super::traits::{Migration, RecordMigration};
use anyhow::{Context, Result};
use serde_json::Value;

#[derive(Debug, Default)]
pub struct ChatAnswersV1Migration;

impl Migration for ChatAnswersV1Migration {
    fn from_version(&self) -> u32 {
        1
    }

    fn to_version(&self) -> u32 {
        2
    }

    fn description(&self) -> &str {
        "convert Answers tuples into messages"
    }
}

impl RecordMigration for ChatAnswersV1Migration {
    fn migrate(&self, record: Value) -> Result<Value> {
        let row_id = record
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let legacy: LegacyChatRecord =
            serde_json::from_value(record).context("unrecognised chat record shape")?;
        let current = legacy.into_current(&row_id);
        Ok(serde_json::to_value(current)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::plan::MigrationPlan;
    use crate::sqlite::{ConnectionRegistry, SqliteCollection, UpgradeHook};
    use parley_core::record::{ChatResponse, DbObject, SessionConfig};
    use parley_core::store::RecordStore;
    use parley_core::store_config::StoreConfig;
    use rusqlite::{Connection, params};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    type ChatRecord = DbObject<ChatResponse, SessionConfig>;

    fn hook() -> UpgradeHook {
        MigrationPlan::new::<ChatRecord>(2)
            .with(Arc::new(ChatAnswersV1Migration))
            .into_hook()
    }

    fn seed_v1(path: &std::path::Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE sessions (id TEXT PRIMARY KEY, body TEXT NOT NULL);
             PRAGMA user_version = 1;",
        )
        .unwrap();
        let body = json!({
            "id": "old",
            "Answers": [["What is Rust?", "A language.", 12], ["Is it fast?", "Yes."]],
            "lastEdited": 1_000,
            "name": "Rust questions"
        });
        conn.execute(
            "INSERT INTO sessions (id, body) VALUES (?1, ?2)",
            params!["old", body.to_string()],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_v1_records_are_readable_after_upgrade() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(ConnectionRegistry::new(dir.path()));
        seed_v1(&registry.db_path("parley-chat"));

        let collection = SqliteCollection::new(
            StoreConfig::new("parley-chat", 2, "sessions"),
            registry,
            Some(hook()),
        )
        .unwrap();
        let store: RecordStore<ChatResponse, SessionConfig> =
            RecordStore::with_system_clock(Arc::new(collection));

        let record = store.get("old").await.unwrap().unwrap();
        assert_eq!(record.name.as_deref(), Some("Rust questions"));
        assert_eq!(record.last_edited, 1_000);
        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.messages[0].user, "What is Rust?");
        assert_eq!(record.messages[0].response.tokens, 12);
        assert_eq!(record.messages[1].response.answer, "Yes.");
    }

    #[tokio::test]
    async fn test_unmigratable_record_aborts_the_upgrade() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(ConnectionRegistry::new(dir.path()));
        let path = registry.db_path("parley-chat");
        seed_v1(&path);
        Connection::open(&path)
            .unwrap()
            .execute(
                "INSERT INTO sessions (id, body) VALUES ('bad', '{\"unexpected\": true}')",
                [],
            )
            .unwrap();

        let collection = SqliteCollection::new(
            StoreConfig::new("parley-chat", 2, "sessions"),
            registry,
            Some(hook()),
        )
        .unwrap();
        let store: RecordStore<ChatResponse, SessionConfig> =
            RecordStore::with_system_clock(Arc::new(collection));

        let err = store.get("old").await.unwrap_err();
        assert!(err.is_connection());

        // Still at version 1 with the legacy body intact.
        let conn = Connection::open(&path).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
        let body: String = conn
            .query_row("SELECT body FROM sessions WHERE id = 'old'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(body.contains("Answers"));
    }
}
