//! [`CollectionBackend`] over one SQLite table.

use super::registry::{ConnectionRegistry, SharedConnection, UpgradeHook};
use super::{create_collection_table, db_error, lock, validate_table_name};
use async_trait::async_trait;
use parley_core::backend::CollectionBackend;
use parley_core::error::{ParleyError, Result};
use parley_core::store_config::StoreConfig;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One collection stored as `(id TEXT PRIMARY KEY, body TEXT)` rows holding
/// JSON documents.
///
/// The connection is looked up in the registry on every call, so a
/// connection closed elsewhere is reopened transparently.
pub struct SqliteCollection {
    config: StoreConfig,
    registry: Arc<ConnectionRegistry>,
    hook: Option<UpgradeHook>,
    table_ready: AtomicBool,
}

impl std::fmt::Debug for SqliteCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCollection")
            .field("config", &self.config)
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}

impl SqliteCollection {
    pub fn new(
        config: StoreConfig,
        registry: Arc<ConnectionRegistry>,
        hook: Option<UpgradeHook>,
    ) -> Result<Self> {
        validate_table_name(&config.collection_name)?;
        Ok(Self {
            config,
            registry,
            hook,
            table_ready: AtomicBool::new(false),
        })
    }

    async fn connection(&self) -> Result<SharedConnection> {
        let shared = self.registry.connect(&self.config, self.hook.as_ref()).await?;
        if !self.table_ready.load(Ordering::Acquire) {
            // Another collection may share this database file at the same
            // version, in which case no upgrade created our table.
            let conn = lock(&shared)?;
            create_collection_table(&conn, &self.config.collection_name).map_err(db_error)?;
            drop(conn);
            self.table_ready.store(true, Ordering::Release);
        }
        Ok(shared)
    }

    async fn with_conn<T>(
        &self,
        op: impl FnOnce(&Connection, &str) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let shared = self.connection().await?;
        let conn = lock(&shared)?;
        op(&conn, &self.config.collection_name).map_err(|e| {
            tracing::error!(
                collection = %self.config.collection_name,
                error = %e,
                "SQLite operation failed"
            );
            db_error(e)
        })
    }
}

fn parse_body(id: &str, body: &str) -> Result<Value> {
    serde_json::from_str(body)
        .map_err(|e| ParleyError::json(format!("record '{id}' is not valid JSON: {e}")))
}

#[async_trait]
impl CollectionBackend for SqliteCollection {
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn get(&self, id: &str) -> Result<Option<Value>> {
        let body: Option<String> = self
            .with_conn(|conn, table| {
                conn.query_row(
                    &format!("SELECT body FROM \"{table}\" WHERE id = ?1"),
                    params![id],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        body.map(|body| parse_body(id, &body)).transpose()
    }

    async fn get_all(&self) -> Result<Vec<Value>> {
        let rows: Vec<(String, String)> = self
            .with_conn(|conn, table| {
                let mut stmt = conn.prepare(&format!("SELECT id, body FROM \"{table}\""))?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect()
            })
            .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for (id, body) in rows {
            match parse_body(&id, &body) {
                Ok(value) => documents.push(value),
                Err(e) => tracing::warn!(
                    collection = %self.config.collection_name,
                    id = %id,
                    error = %e,
                    "Skipping unreadable document"
                ),
            }
        }
        Ok(documents)
    }

    async fn insert(&self, id: &str, body: &Value) -> Result<()> {
        let body = serde_json::to_string(body)?;
        let inserted = self
            .with_conn(|conn, table| {
                conn.execute(
                    &format!("INSERT OR IGNORE INTO \"{table}\" (id, body) VALUES (?1, ?2)"),
                    params![id, body],
                )
            })
            .await?;
        if inserted == 0 {
            return Err(ParleyError::duplicate_id(id));
        }
        Ok(())
    }

    async fn put(&self, id: &str, body: &Value) -> Result<()> {
        let body = serde_json::to_string(body)?;
        self.with_conn(|conn, table| {
            conn.execute(
                &format!(
                    "INSERT INTO \"{table}\" (id, body) VALUES (?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET body = excluded.body"
                ),
                params![id, body],
            )
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.with_conn(|conn, table| {
            conn.execute(&format!("DELETE FROM \"{table}\" WHERE id = ?1"), params![id])
        })
        .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.with_conn(|conn, table| conn.execute(&format!("DELETE FROM \"{table}\""), []))
            .await?;
        Ok(())
    }
}
