//! Assistant configurations and their sessions in one collection.
//!
//! Each assistant (an owner) has one configuration record keyed
//! `CONFIG_<owner>` and any number of sessions keyed `CHAT_<owner>_<id>`.
//! Every public operation is scoped to one owner, so a configuration record
//! never shows up where a session is expected.

use crate::session::{SessionManager, SessionSummary, guard};
use chrono::{DateTime, Local, TimeZone};
use parley_core::listing::{SessionGroups, group_by_recency};
use parley_core::namespace;
use parley_core::record::{AssistantConfig, ChatResponse, DbMessage, DbObject};
use parley_core::store::RecordStore;

pub type AssistantRecord = DbObject<ChatResponse, AssistantConfig>;

/// Outcome of [`AssistantStore::delete_owner_and_sessions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerDeletion {
    pub sessions_deleted: usize,
    /// Session keys whose delete failed; the configuration is kept when
    /// this is non-empty so the owner can still be found and retried.
    pub failed: Vec<String>,
    pub config_deleted: bool,
}

impl OwnerDeletion {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.config_deleted
    }
}

#[derive(Clone)]
pub struct AssistantStore {
    sessions: SessionManager<ChatResponse, AssistantConfig>,
}

impl AssistantStore {
    pub fn new(store: RecordStore<ChatResponse, AssistantConfig>, placeholder: impl Into<String>) -> Self {
        Self {
            sessions: SessionManager::new(store, placeholder),
        }
    }

    /// The unscoped manager over the whole collection, configuration
    /// records included.
    pub(crate) fn sessions(&self) -> &SessionManager<ChatResponse, AssistantConfig> {
        &self.sessions
    }

    fn store(&self) -> &RecordStore<ChatResponse, AssistantConfig> {
        self.sessions.store()
    }

    /// Creates or replaces the configuration of `owner_id`.
    pub async fn save_config(&self, owner_id: &str, config: AssistantConfig) -> Option<AssistantRecord> {
        guard("save_config", Some(owner_id), namespace::validate_owner_id(owner_id))?;
        let key = namespace::config_key(owner_id);

        let existing = guard("save_config", Some(key.as_str()), self.store().get(&key).await)?;
        let saved = match existing {
            Some(_) => guard(
                "save_config",
                Some(key.as_str()),
                self.store().update(&key, None, Some(config)).await,
            )?,
            None => {
                guard(
                    "save_config",
                    Some(key.as_str()),
                    self.store().create(None, Some(config), Some(key.clone())).await,
                )?;
                self.sessions.get(&key).await?
            }
        };

        tracing::info!(owner_id, name = %saved.config.name, "Saved assistant config");
        Some(saved)
    }

    /// The configuration of `owner_id`; `None` when missing or unavailable.
    pub async fn config(&self, owner_id: &str) -> Option<AssistantConfig> {
        self.sessions
            .get(&namespace::config_key(owner_id))
            .await
            .map(|record| record.config)
    }

    /// Every owner with a configuration record, sorted by owner id.
    pub async fn list_owners(&self) -> Option<Vec<(String, AssistantConfig)>> {
        let records = guard("list_owners", None, self.store().get_all().await)?;
        let mut owners: Vec<_> = records
            .into_iter()
            .filter_map(|record| {
                let owner = namespace::owner_of_config(&record.id)?.to_string();
                Some((owner, record.config))
            })
            .collect();
        owners.sort_by(|a, b| a.0.cmp(&b.0));
        Some(owners)
    }

    /// Starts a session for `owner_id` using the owner's current settings.
    ///
    /// The new session becomes active.
    pub async fn create_session(
        &self,
        owner_id: &str,
        messages: Option<Vec<DbMessage<ChatResponse>>>,
    ) -> Option<String> {
        guard("create_session", Some(owner_id), namespace::validate_owner_id(owner_id))?;
        let config = self.config(owner_id).await;
        let key = namespace::session_key(owner_id, &RecordStore::<ChatResponse, AssistantConfig>::new_id());

        let id = guard(
            "create_session",
            Some(key.as_str()),
            self.store().create(messages, config, Some(key.clone())).await,
        )?;
        self.sessions.set_active(Some(id.clone())).await;
        Some(id)
    }

    /// Sessions of `owner_id`, newest first. Never includes configuration
    /// records or sessions of other owners.
    pub async fn list_sessions_for_owner(&self, owner_id: &str) -> Option<Vec<AssistantRecord>> {
        let records = guard("list_sessions_for_owner", Some(owner_id), self.store().get_all().await)?;
        let mut sessions: Vec<_> = records
            .into_iter()
            .filter(|record| namespace::is_session_of(&record.id, owner_id))
            .collect();
        sessions.sort_by(|a, b| b.last_edited.cmp(&a.last_edited));
        Some(sessions)
    }

    pub async fn newest_session_for_owner(&self, owner_id: &str) -> Option<AssistantRecord> {
        self.list_sessions_for_owner(owner_id)
            .await?
            .into_iter()
            .next()
    }

    /// Sessions of `owner_id` grouped by recency in the local time zone.
    pub async fn list_sorted_for_owner(&self, owner_id: &str) -> Option<SessionGroups<SessionSummary>> {
        self.list_sorted_for_owner_at(owner_id, &Local::now()).await
    }

    pub async fn list_sorted_for_owner_at<Tz: TimeZone>(
        &self,
        owner_id: &str,
        now: &DateTime<Tz>,
    ) -> Option<SessionGroups<SessionSummary>> {
        let sessions = self.list_sessions_for_owner(owner_id).await?;
        Some(group_by_recency(sessions, now).map(|record| self.sessions.summarize(&record)))
    }

    /// The active session, if one is set. Never a configuration record.
    pub async fn active_session(&self) -> Option<String> {
        self.sessions
            .active_session()
            .await
            .filter(|id| !namespace::is_config_key(id))
    }

    /// Makes `session_id` of `owner_id` the active session.
    pub async fn resume_session(&self, owner_id: &str, session_id: &str) -> Option<AssistantRecord> {
        let record = self.session(owner_id, session_id).await?;
        self.sessions.set_active(Some(record.id.clone())).await;
        Some(record)
    }

    /// A session of `owner_id`; `None` for configuration records, sessions
    /// of other owners and missing ids.
    pub async fn session(&self, owner_id: &str, session_id: &str) -> Option<AssistantRecord> {
        self.owned(owner_id, session_id)?;
        self.sessions.get(session_id).await
    }

    pub async fn rename_session(&self, owner_id: &str, session_id: &str, name: &str) -> Option<AssistantRecord> {
        self.owned(owner_id, session_id)?;
        self.sessions.rename_session(session_id, name).await
    }

    pub async fn rollback(&self, owner_id: &str, session_id: &str, user_text: &str) -> Option<AssistantRecord> {
        self.owned(owner_id, session_id)?;
        self.sessions.rollback(session_id, user_text).await
    }

    pub async fn pop(&self, owner_id: &str, session_id: &str) -> Option<DbMessage<ChatResponse>> {
        self.owned(owner_id, session_id)?;
        self.sessions.pop(session_id).await
    }

    fn owned(&self, owner_id: &str, session_id: &str) -> Option<()> {
        if namespace::is_session_of(session_id, owner_id) {
            Some(())
        } else {
            tracing::warn!(owner_id, session_id, "Not a session of this assistant");
            None
        }
    }

    /// Deletes every session of `owner_id`, then its configuration.
    ///
    /// The store has no multi-record transaction. Sessions go first so that a
    /// partial failure leaves the configuration in place and the owner stays
    /// listed; the report says what was removed. `None` means the session
    /// list could not be read and nothing was deleted.
    pub async fn delete_owner_and_sessions(&self, owner_id: &str) -> Option<OwnerDeletion> {
        let sessions = self.list_sessions_for_owner(owner_id).await?;
        let active = self.sessions.active_session().await;
        let mut report = OwnerDeletion::default();

        for session in sessions {
            match self.store().delete(&session.id).await {
                Ok(()) => report.sessions_deleted += 1,
                Err(e) => {
                    tracing::error!(owner_id, id = %session.id, error = %e, "Failed to delete assistant session");
                    report.failed.push(session.id);
                }
            }
        }

        if active.as_deref().is_some_and(|id| namespace::is_session_of(id, owner_id)) {
            self.sessions.set_active(None).await;
        }

        if report.failed.is_empty() {
            let key = namespace::config_key(owner_id);
            report.config_deleted =
                guard("delete_owner_and_sessions", Some(key.as_str()), self.store().delete(&key).await).is_some();
        } else {
            tracing::warn!(
                owner_id,
                failed = report.failed.len(),
                "Keeping assistant config after partial delete"
            );
        }

        tracing::info!(
            owner_id,
            sessions_deleted = report.sessions_deleted,
            config_deleted = report.config_deleted,
            "Deleted assistant"
        );
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::backend::{CollectionBackend, MemoryCollection};
    use parley_core::clock::ManualClock;
    use parley_core::error::{ParleyError, Result};
    use parley_core::store_config::StoreConfig;
    use serde_json::Value;
    use std::sync::Arc;

    fn assistant(name: &str) -> AssistantConfig {
        AssistantConfig {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn store_with(backend: Arc<dyn CollectionBackend>) -> (AssistantStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let records = RecordStore::new(backend, clock.clone());
        (AssistantStore::new(records, "New chat"), clock)
    }

    fn memory() -> Arc<dyn CollectionBackend> {
        Arc::new(MemoryCollection::new(StoreConfig::new("assistants", 1, "assistants")))
    }

    #[tokio::test]
    async fn test_save_config_creates_then_updates() {
        let (store, _) = store_with(memory());
        let created = store.save_config("7", assistant("Tutor")).await.unwrap();
        assert_eq!(created.id, "CONFIG_7");

        let updated = store.save_config("7", assistant("Coach")).await.unwrap();
        assert_eq!(updated.config.name, "Coach");
        assert!(updated.rev > created.rev);
        assert_eq!(store.config("7").await.unwrap().name, "Coach");
    }

    #[tokio::test]
    async fn test_owner_id_with_delimiter_is_rejected() {
        let (store, _) = store_with(memory());
        assert!(store.save_config("a_b", assistant("x")).await.is_none());
        assert!(store.create_session("a_b", None).await.is_none());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_per_owner() {
        let (store, clock) = store_with(memory());
        store.save_config("7", assistant("Seven")).await.unwrap();
        store.save_config("70", assistant("Seventy")).await.unwrap();

        let first = store.create_session("7", None).await.unwrap();
        clock.advance(5);
        let second = store.create_session("7", None).await.unwrap();
        let other = store.create_session("70", None).await.unwrap();

        let sessions = store.list_sessions_for_owner("7").await.unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);
        assert!(!ids.contains(&"CONFIG_7"));
        assert!(!ids.contains(&other.as_str()));

        // Sessions inherit the owner's settings.
        assert_eq!(sessions[0].config.name, "Seven");
        assert_eq!(store.newest_session_for_owner("7").await.unwrap().id, second);

        let owners = store.list_owners().await.unwrap();
        let names: Vec<&str> = owners.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(names, vec!["7", "70"]);
    }

    #[tokio::test]
    async fn test_delete_owner_removes_config_and_sessions() {
        let (store, _) = store_with(memory());
        store.save_config("7", assistant("Seven")).await.unwrap();
        store.save_config("70", assistant("Seventy")).await.unwrap();
        store.create_session("7", None).await.unwrap();
        let active = store.create_session("7", None).await.unwrap();
        let kept = store.create_session("70", None).await.unwrap();
        store.resume_session("7", &active).await.unwrap();

        let report = store.delete_owner_and_sessions("7").await.unwrap();
        assert_eq!(report.sessions_deleted, 2);
        assert!(report.is_complete());

        assert!(store.config("7").await.is_none());
        assert!(store.list_sessions_for_owner("7").await.unwrap().is_empty());
        assert_eq!(store.active_session().await, None);
        assert!(store.session("70", &kept).await.is_some());
        assert!(store.config("70").await.is_some());
    }

    #[tokio::test]
    async fn test_config_record_is_never_treated_as_session() {
        let (store, clock) = store_with(memory());
        let session = store
            .create_session("7", Some(vec![DbMessage::new("hi", ChatResponse::new("hello", 1, 1))]))
            .await
            .unwrap();
        clock.advance(10);
        store.save_config("7", assistant("Seven")).await.unwrap();

        // The config was written last, yet it is not the newest session.
        assert_eq!(store.newest_session_for_owner("7").await.unwrap().id, session);

        let groups = store
            .list_sorted_for_owner_at("7", &chrono::Utc::now())
            .await
            .unwrap();
        let ids: Vec<String> = groups
            .favorites
            .iter()
            .chain(&groups.today)
            .chain(&groups.yesterday)
            .chain(&groups.last_week)
            .chain(&groups.older)
            .map(|summary| summary.id.clone())
            .collect();
        assert_eq!(ids, vec![session.clone()]);

        assert!(store.pop("7", "CONFIG_7").await.is_none());
        assert!(store.rollback("7", "CONFIG_7", "hi").await.is_none());
        assert!(store.resume_session("7", "CONFIG_7").await.is_none());
        assert_eq!(store.config("7").await.unwrap().name, "Seven");
        assert_eq!(store.active_session().await, Some(session.clone()));
    }

    #[tokio::test]
    async fn test_session_edits_stay_within_owner() {
        let (store, _) = store_with(memory());
        let seven = store
            .create_session("7", Some(vec![DbMessage::new("a", ChatResponse::new("x", 1, 1))]))
            .await
            .unwrap();

        assert!(store.pop("70", &seven).await.is_none());
        assert!(store.rename_session("70", &seven, "stolen").await.is_none());
        assert_eq!(store.session("7", &seven).await.unwrap().messages.len(), 1);

        let renamed = store.rename_session("7", &seven, " Notes ").await.unwrap();
        assert_eq!(renamed.name.as_deref(), Some("Notes"));
        assert_eq!(store.pop("7", &seven).await.unwrap().user, "a");
    }

    /// Memory collection whose deletes fail for keys containing a marker.
    struct FlakyDeletes {
        inner: MemoryCollection,
        marker: String,
    }

    #[async_trait]
    impl CollectionBackend for FlakyDeletes {
        fn config(&self) -> &StoreConfig {
            self.inner.config()
        }
        async fn get(&self, id: &str) -> Result<Option<Value>> {
            self.inner.get(id).await
        }
        async fn get_all(&self) -> Result<Vec<Value>> {
            self.inner.get_all().await
        }
        async fn insert(&self, id: &str, value: &Value) -> Result<()> {
            self.inner.insert(id, value).await
        }
        async fn put(&self, id: &str, value: &Value) -> Result<()> {
            self.inner.put(id, value).await
        }
        async fn delete(&self, id: &str) -> Result<()> {
            if id.contains(&self.marker) {
                return Err(ParleyError::database("disk I/O error"));
            }
            self.inner.delete(id).await
        }
        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn test_partial_delete_keeps_config() {
        let backend = Arc::new(FlakyDeletes {
            inner: MemoryCollection::new(StoreConfig::new("assistants", 1, "assistants")),
            marker: "CHAT_9_".to_string(),
        });
        let (store, _) = store_with(backend);
        store.save_config("9", assistant("Nine")).await.unwrap();
        let session = store.create_session("9", None).await.unwrap();

        let report = store.delete_owner_and_sessions("9").await.unwrap();
        assert_eq!(report.failed, vec![session]);
        assert!(!report.config_deleted);
        assert!(!report.is_complete());
        assert!(store.config("9").await.is_some());
    }
}
