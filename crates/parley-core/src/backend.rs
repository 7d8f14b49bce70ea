//! Collection backend trait.
//!
//! Defines the raw document operations a physical collection must provide.
//! [`crate::store::RecordStore`] builds every record-level operation on top
//! of these primitives.

use crate::error::{ParleyError, Result};
use crate::store_config::StoreConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// An abstract key/document collection.
///
/// Implementations own connection handling: every call may (re)open the
/// underlying database on demand, and an unreachable database is reported as
/// [`ParleyError::Connection`].
///
/// No method offers multi-call atomicity. Read-modify-write sequences built on
/// top of `get` + `put` can interleave with other writers.
#[async_trait]
pub trait CollectionBackend: Send + Sync {
    /// The descriptor this backend was opened with.
    fn config(&self) -> &StoreConfig;

    /// Fetches one document.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Value))`: Document found
    /// - `Ok(None)`: No document under `id`
    /// - `Err(_)`: The collection could not be read
    async fn get(&self, id: &str) -> Result<Option<Value>>;

    /// Fetches every document, in no particular order.
    async fn get_all(&self) -> Result<Vec<Value>>;

    /// Inserts a new document.
    ///
    /// Fails with [`ParleyError::DuplicateId`] when `id` already exists.
    async fn insert(&self, id: &str, body: &Value) -> Result<()>;

    /// Inserts or replaces a document.
    async fn put(&self, id: &str, body: &Value) -> Result<()>;

    /// Removes a document. Removing an absent id succeeds.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Removes every document.
    async fn clear(&self) -> Result<()>;
}

/// A process-local collection backed by a `HashMap`.
///
/// Useful for ephemeral stores and for exercising store logic without a
/// database file.
#[derive(Debug)]
pub struct MemoryCollection {
    config: StoreConfig,
    documents: Mutex<HashMap<String, Value>>,
}

impl MemoryCollection {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            documents: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>> {
        self.documents
            .lock()
            .map_err(|_| ParleyError::internal("memory collection mutex poisoned"))
    }
}

#[async_trait]
impl CollectionBackend for MemoryCollection {
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn get(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Value>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    async fn insert(&self, id: &str, body: &Value) -> Result<()> {
        let mut documents = self.lock()?;
        if documents.contains_key(id) {
            return Err(ParleyError::duplicate_id(id));
        }
        documents.insert(id.to_string(), body.clone());
        Ok(())
    }

    async fn put(&self, id: &str, body: &Value) -> Result<()> {
        self.lock()?.insert(id.to_string(), body.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.lock()?.remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}
