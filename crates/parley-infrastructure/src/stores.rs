//! Builds the record stores of every [`StoreArea`].

use crate::migration::{ChatAnswersV1Migration, MigrationPlan};
use crate::sqlite::{ConnectionRegistry, SqliteCollection, UpgradeHook};
use parley_core::backend::CollectionBackend;
use parley_core::clock::{Clock, SystemClock};
use parley_core::error::Result;
use parley_core::record::{
    AssistantConfig, ChatResponse, DbObject, MindMapResponse, SessionConfig, SummaryResponse,
};
use parley_core::settings::Settings;
use parley_core::store::RecordStore;
use parley_core::store_config::{StoreArea, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;

pub type ChatStore = RecordStore<ChatResponse, SessionConfig>;
pub type SummaryStore = RecordStore<SummaryResponse, SessionConfig>;
pub type BrainstormStore = RecordStore<MindMapResponse, SessionConfig>;
/// Assistant configuration records and their sessions share this shape.
pub type AssistantRecordStore = RecordStore<ChatResponse, AssistantConfig>;

/// The migration plan for `config` in `area`.
///
/// The chat area carries the v1 → v2 tuple conversion; the other areas rely
/// on the destructive fallback.
pub fn migration_plan(area: StoreArea, config: &StoreConfig) -> MigrationPlan {
    match area {
        StoreArea::Chat => {
            let plan = MigrationPlan::new::<DbObject<ChatResponse, SessionConfig>>(config.version);
            if config.version >= 2 {
                plan.with(Arc::new(ChatAnswersV1Migration))
            } else {
                plan
            }
        }
        StoreArea::Summarize => {
            MigrationPlan::new::<DbObject<SummaryResponse, SessionConfig>>(config.version)
        }
        StoreArea::Brainstorm => {
            MigrationPlan::new::<DbObject<MindMapResponse, SessionConfig>>(config.version)
        }
        StoreArea::Assistants | StoreArea::AssistantHistory => {
            MigrationPlan::new::<DbObject<ChatResponse, AssistantConfig>>(config.version)
        }
    }
}

/// Creates SQLite-backed stores from settings.
///
/// Store descriptors are resolved once, at construction; stores built from
/// one factory share one connection registry.
#[derive(Clone)]
pub struct StoreFactory {
    registry: Arc<ConnectionRegistry>,
    settings: Settings,
    clock: Arc<dyn Clock>,
}

impl StoreFactory {
    pub fn new(data_dir: impl Into<PathBuf>, settings: Settings) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new(data_dir)),
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn store_config(&self, area: StoreArea) -> StoreConfig {
        self.settings.store_config(area)
    }

    pub fn backend(&self, area: StoreArea) -> Result<Arc<dyn CollectionBackend>> {
        let config = self.store_config(area);
        let hook: UpgradeHook = migration_plan(area, &config).into_hook();
        let collection = SqliteCollection::new(config, Arc::clone(&self.registry), Some(hook))?;
        Ok(Arc::new(collection))
    }

    fn store<R, C>(&self, area: StoreArea) -> Result<RecordStore<R, C>>
    where
        R: parley_core::store::Document,
        C: parley_core::store::Document + Default,
    {
        Ok(RecordStore::new(self.backend(area)?, Arc::clone(&self.clock)))
    }

    pub fn chat(&self) -> Result<ChatStore> {
        self.store(StoreArea::Chat)
    }

    pub fn summarize(&self) -> Result<SummaryStore> {
        self.store(StoreArea::Summarize)
    }

    pub fn brainstorm(&self) -> Result<BrainstormStore> {
        self.store(StoreArea::Brainstorm)
    }

    pub fn assistants(&self) -> Result<AssistantRecordStore> {
        self.store(StoreArea::Assistants)
    }

    pub fn assistant_history(&self) -> Result<AssistantRecordStore> {
        self.store(StoreArea::AssistantHistory)
    }
}
