//! Record-level operations over one physical collection.
//!
//! `RecordStore` turns the raw documents of a [`CollectionBackend`] into typed
//! [`DbObject`]s and implements the session CRUD contract: create, get,
//! update, delete, append, pop, rollback and newest lookup.
//!
//! Every compound operation is a plain read-modify-write: the record is read,
//! changed in memory and written back. Two concurrent mutations of the same id
//! can interleave and the later write wins. Callers that need to detect this
//! use [`RecordStore::update_checked`].

use crate::backend::CollectionBackend;
use crate::clock::{Clock, SystemClock};
use crate::error::{ParleyError, Result};
use crate::record::{DbMessage, DbObject};
use crate::store_config::StoreConfig;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

const ENTITY: &str = "Record";

/// Bounds shared by response payloads and session configs.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Document for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Typed CRUD over one collection.
pub struct RecordStore<R, C> {
    backend: Arc<dyn CollectionBackend>,
    clock: Arc<dyn Clock>,
    _marker: PhantomData<fn() -> (R, C)>,
}

impl<R, C> Clone for RecordStore<R, C> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            clock: Arc::clone(&self.clock),
            _marker: PhantomData,
        }
    }
}

impl<R: Document, C: Document + Default> RecordStore<R, C> {
    pub fn new(backend: Arc<dyn CollectionBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            _marker: PhantomData,
        }
    }

    pub fn with_system_clock(backend: Arc<dyn CollectionBackend>) -> Self {
        Self::new(backend, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &StoreConfig {
        self.backend.config()
    }

    /// Generates a fresh record id.
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn collection(&self) -> &str {
        &self.backend.config().collection_name
    }

    fn encode(record: &DbObject<R, C>) -> Result<Value> {
        Ok(serde_json::to_value(record)?)
    }

    fn decode(value: Value) -> Result<DbObject<R, C>> {
        Ok(serde_json::from_value(value)?)
    }

    /// Bumps `last_edited` (strictly) and `rev`.
    fn stamp(&self, record: &mut DbObject<R, C>) {
        let now = self.clock.now_millis();
        record.last_edited = now.max(record.last_edited.saturating_add(1));
        record.rev += 1;
    }

    async fn require(&self, id: &str) -> Result<DbObject<R, C>> {
        self.get(id)
            .await?
            .ok_or_else(|| ParleyError::not_found(ENTITY, id))
    }

    /// Creates a record and returns its id.
    ///
    /// Missing `messages` start empty, a missing `config` is `C::default()`,
    /// and a missing `id` is generated.
    ///
    /// # Errors
    ///
    /// - [`ParleyError::DuplicateId`] when `id` is already taken
    /// - [`ParleyError::Invalid`] when a message has an empty `user` field
    pub async fn create(
        &self,
        messages: Option<Vec<DbMessage<R>>>,
        config: Option<C>,
        id: Option<String>,
    ) -> Result<String> {
        let id = id.unwrap_or_else(Self::new_id);
        let messages = messages.unwrap_or_default();
        validate_messages(&messages)?;

        let record = DbObject {
            id: id.clone(),
            messages,
            config: config.unwrap_or_default(),
            last_edited: self.clock.now_millis(),
            name: None,
            favorite: None,
            rev: 1,
        };
        self.backend.insert(&id, &Self::encode(&record)?).await?;

        tracing::debug!(collection = self.collection(), id = %id, "Created record");
        Ok(id)
    }

    /// Fetches a record. Absence is `Ok(None)`, not an error.
    pub async fn get(&self, id: &str) -> Result<Option<DbObject<R, C>>> {
        match self.backend.get(id).await? {
            Some(value) => Ok(Some(Self::decode(value)?)),
            None => Ok(None),
        }
    }

    /// Fetches every record, unordered.
    ///
    /// Documents that no longer decode are skipped with a warning so that one
    /// damaged record does not hide the rest of the collection.
    pub async fn get_all(&self) -> Result<Vec<DbObject<R, C>>> {
        let values = self.backend.get_all().await?;
        let mut records = Vec::with_capacity(values.len());
        for value in values {
            match Self::decode(value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        collection = self.collection(),
                        error = %e,
                        "Skipping undecodable record"
                    );
                }
            }
        }
        Ok(records)
    }

    /// Loads a record, applies `updater`, stamps it and writes it back.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The record doesn't exist
    /// - The updater function returns an error
    /// - Saving to storage fails
    pub async fn modify<T, F>(&self, id: &str, updater: F) -> Result<(DbObject<R, C>, T)>
    where
        F: FnOnce(&mut DbObject<R, C>) -> Result<T>,
    {
        let mut record = self.require(id).await?;
        let output = updater(&mut record)?;
        self.stamp(&mut record);
        self.backend.put(id, &Self::encode(&record)?).await?;

        tracing::debug!(
            collection = self.collection(),
            id,
            rev = record.rev,
            "Updated record"
        );
        Ok((record, output))
    }

    /// Replaces only the supplied fields.
    pub async fn update(
        &self,
        id: &str,
        messages: Option<Vec<DbMessage<R>>>,
        config: Option<C>,
    ) -> Result<DbObject<R, C>> {
        let (record, ()) = self
            .modify(id, |record| apply_fields(record, messages, config))
            .await?;
        Ok(record)
    }

    /// Like [`update`](Self::update), but refuses to write when the stored
    /// revision differs from `expected_rev`.
    ///
    /// The check and the write are still two backend calls; this detects
    /// stale editors, it does not serialize writers.
    pub async fn update_checked(
        &self,
        id: &str,
        expected_rev: u64,
        messages: Option<Vec<DbMessage<R>>>,
        config: Option<C>,
    ) -> Result<DbObject<R, C>> {
        let (record, ()) = self
            .modify(id, |record| {
                if record.rev != expected_rev {
                    return Err(ParleyError::StaleRevision {
                        id: record.id.clone(),
                        expected: expected_rev,
                        actual: record.rev,
                    });
                }
                apply_fields(record, messages, config)
            })
            .await?;
        Ok(record)
    }

    /// Inserts or replaces a fully formed record, stamping it first.
    pub async fn put(&self, mut record: DbObject<R, C>) -> Result<DbObject<R, C>> {
        validate_messages(&record.messages)?;
        self.stamp(&mut record);
        self.backend.put(&record.id, &Self::encode(&record)?).await?;
        Ok(record)
    }

    /// Removes a record. Deleting an absent id is a no-op.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.backend.delete(id).await?;
        tracing::debug!(collection = self.collection(), id, "Deleted record");
        Ok(())
    }

    /// Removes every record in the collection.
    pub async fn clear_all(&self) -> Result<()> {
        self.backend.clear().await?;
        tracing::info!(collection = self.collection(), "Cleared collection");
        Ok(())
    }

    /// Pushes `message` and optionally replaces the config.
    pub async fn append_message(
        &self,
        id: &str,
        message: DbMessage<R>,
        config: Option<C>,
    ) -> Result<DbObject<R, C>> {
        validate_message(&message)?;
        let (record, ()) = self
            .modify(id, |record| {
                record.messages.push(message);
                if let Some(config) = config {
                    record.config = config;
                }
                Ok(())
            })
            .await?;
        Ok(record)
    }

    /// Removes and returns the last message.
    ///
    /// An empty session yields `Ok(None)` and is left untouched.
    pub async fn pop_message(&self, id: &str) -> Result<Option<DbMessage<R>>> {
        let mut record = self.require(id).await?;
        let Some(message) = record.messages.pop() else {
            return Ok(None);
        };
        self.stamp(&mut record);
        self.backend.put(id, &Self::encode(&record)?).await?;
        Ok(Some(message))
    }

    /// Drops messages from the tail up to and including the most recent one
    /// whose `user` equals `user_text`; with no match the list ends up empty.
    pub async fn rollback_message(&self, id: &str, user_text: &str) -> Result<DbObject<R, C>> {
        let (record, removed) = self
            .modify(id, |record| {
                Ok(truncate_through_last(&mut record.messages, user_text))
            })
            .await?;
        tracing::debug!(
            collection = self.collection(),
            id,
            removed,
            remaining = record.messages.len(),
            "Rolled back messages"
        );
        Ok(record)
    }

    /// The record with the greatest `last_edited`, if any.
    pub async fn get_newest(&self) -> Result<Option<DbObject<R, C>>> {
        let records = self.get_all().await?;
        Ok(records.into_iter().max_by_key(|r| r.last_edited))
    }
}

fn apply_fields<R, C>(
    record: &mut DbObject<R, C>,
    messages: Option<Vec<DbMessage<R>>>,
    config: Option<C>,
) -> Result<()> {
    if let Some(messages) = messages {
        validate_messages(&messages)?;
        record.messages = messages;
    }
    if let Some(config) = config {
        record.config = config;
    }
    Ok(())
}

fn validate_message<R>(message: &DbMessage<R>) -> Result<()> {
    if message.user.trim().is_empty() {
        return Err(ParleyError::invalid("message user text must not be empty"));
    }
    Ok(())
}

fn validate_messages<R>(messages: &[DbMessage<R>]) -> Result<()> {
    messages.iter().try_for_each(validate_message)
}

/// Pops from the tail until a message with `user == user_text` has been
/// removed. Returns the number of removed messages.
fn truncate_through_last<R>(messages: &mut Vec<DbMessage<R>>, user_text: &str) -> usize {
    let mut removed = 0;
    while let Some(message) = messages.pop() {
        removed += 1;
        if message.user == user_text {
            break;
        }
    }
    removed
}
