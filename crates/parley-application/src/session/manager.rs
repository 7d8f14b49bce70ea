use super::updater::SessionUpdater;
use chrono::{DateTime, Local, TimeZone};
use parley_core::error::{ParleyError, Result};
use parley_core::listing::{SessionGroups, group_by_recency};
use parley_core::record::{DbMessage, DbObject, Timestamp, TokenUsage};
use parley_core::store::{Document, RecordStore};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One row of the session list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    /// The session name, or the placeholder when it was never named.
    pub name: String,
    pub last_edited: Timestamp,
    pub favorite: bool,
    pub message_count: usize,
    pub total_tokens: u64,
}

/// Session-level operations for the UI.
///
/// `SessionManager` is responsible for:
/// - Creating sessions and tracking the active one
/// - Appending, rolling back and popping messages
/// - Renaming and marking favorites
/// - Listing sessions grouped by recency
///
/// Store failures are logged here and reported as `None`: a `None` result
/// means "unavailable", never "empty". Read-modify-write operations take no
/// lock, so two concurrent writes to one session resolve to the later one.
pub struct SessionManager<R, C> {
    store: RecordStore<R, C>,
    /// Session the UI is currently writing to
    active: Arc<RwLock<Option<String>>>,
    placeholder: String,
}

impl<R, C> Clone for SessionManager<R, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            active: Arc::clone(&self.active),
            placeholder: self.placeholder.clone(),
        }
    }
}

impl<R: Document + TokenUsage, C: Document + Default> SessionManager<R, C> {
    /// Creates a new `SessionManager`.
    ///
    /// # Arguments
    ///
    /// * `store` - The record store holding the sessions
    /// * `placeholder` - Display name of sessions that were never renamed
    pub fn new(store: RecordStore<R, C>, placeholder: impl Into<String>) -> Self {
        Self {
            store,
            active: Arc::new(RwLock::new(None)),
            placeholder: placeholder.into(),
        }
    }

    /// The underlying store, for callers that need `Result`s.
    pub fn store(&self) -> &RecordStore<R, C> {
        &self.store
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub async fn active_session(&self) -> Option<String> {
        self.active.read().await.clone()
    }

    pub async fn set_active(&self, session_id: Option<String>) {
        *self.active.write().await = session_id;
    }

    /// Creates a session and makes it active.
    pub async fn start_session(
        &self,
        messages: Option<Vec<DbMessage<R>>>,
        config: Option<C>,
    ) -> Option<String> {
        let id = guard(
            "start_session",
            None,
            self.store.create(messages, config, None).await,
        )?;
        self.set_active(Some(id.clone())).await;
        tracing::info!(session_id = %id, "Started session");
        Some(id)
    }

    pub async fn get(&self, session_id: &str) -> Option<DbObject<R, C>> {
        guard("get", Some(session_id), self.store.get(session_id).await).flatten()
    }

    pub async fn append(
        &self,
        session_id: &str,
        message: DbMessage<R>,
        config: Option<C>,
    ) -> Option<DbObject<R, C>> {
        guard(
            "append",
            Some(session_id),
            self.store.append_message(session_id, message, config).await,
        )
    }

    /// Truncates back to and including the most recent message asked as
    /// `user_text`.
    pub async fn rollback(&self, session_id: &str, user_text: &str) -> Option<DbObject<R, C>> {
        guard(
            "rollback",
            Some(session_id),
            self.store.rollback_message(session_id, user_text).await,
        )
    }

    /// Removes the last message; `None` for an empty or unavailable session.
    pub async fn pop(&self, session_id: &str) -> Option<DbMessage<R>> {
        guard("pop", Some(session_id), self.store.pop_message(session_id).await).flatten()
    }

    /// Sets the session name; a blank name reverts to the placeholder.
    pub async fn rename_session(&self, session_id: &str, name: &str) -> Option<DbObject<R, C>> {
        let name = name.trim();
        let name = (!name.is_empty()).then(|| name.to_string());
        let result = self
            .updater()
            .update(session_id, |session| {
                session.name = name;
                Ok(())
            })
            .await;
        guard("rename_session", Some(session_id), result)
    }

    pub async fn set_favorite(&self, session_id: &str, favorite: bool) -> Option<DbObject<R, C>> {
        let result = self
            .updater()
            .update(session_id, |session| {
                session.favorite = Some(favorite);
                Ok(())
            })
            .await;
        guard("set_favorite", Some(session_id), result)
    }

    pub async fn newest(&self) -> Option<DbObject<R, C>> {
        guard("newest", None, self.store.get_newest().await).flatten()
    }

    /// All sessions grouped by recency in the local time zone.
    pub async fn list_sorted(&self) -> Option<SessionGroups<SessionSummary>> {
        self.list_sorted_at(&Local::now()).await
    }

    pub async fn list_sorted_at<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> Option<SessionGroups<SessionSummary>> {
        let records = guard("list_sorted", None, self.store.get_all().await)?;
        Some(group_by_recency(records, now).map(|record| self.summarize(&record)))
    }

    /// Deletes a session and, if it was active, clears the active pointer.
    pub async fn clear(&self, session_id: &str) -> Option<()> {
        guard("clear", Some(session_id), self.store.delete(session_id).await)?;
        let mut active = self.active.write().await;
        if active.as_deref() == Some(session_id) {
            *active = None;
        }
        tracing::info!(session_id, "Cleared session");
        Some(())
    }

    /// Deletes every session of the collection.
    pub async fn clear_all(&self) -> Option<()> {
        guard("clear_all", None, self.store.clear_all().await)?;
        self.set_active(None).await;
        Some(())
    }

    pub fn summarize(&self, record: &DbObject<R, C>) -> SessionSummary {
        SessionSummary {
            id: record.id.clone(),
            name: record.display_name(&self.placeholder).to_string(),
            last_edited: record.last_edited,
            favorite: record.is_favorite(),
            message_count: record.messages.len(),
            total_tokens: record.total_tokens(),
        }
    }

    fn updater(&self) -> SessionUpdater<R, C> {
        SessionUpdater::new(self.store.clone())
    }
}

/// Logs a failed store call and turns it into `None`.
///
/// A missing session is expected in normal use (the UI may hold a stale id)
/// and is logged at `warn`; anything else is an `error`.
pub(crate) fn guard<T>(operation: &'static str, id: Option<&str>, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e @ ParleyError::NotFound { .. }) => {
            tracing::warn!(operation, id = ?id, error = %e, "Session not found");
            None
        }
        Err(e) => {
            tracing::error!(operation, id = ?id, error = %e, "Session store unavailable");
            None
        }
    }
}
