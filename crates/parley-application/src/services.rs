//! Wires stores, managers and the transport together.

use crate::assistant::AssistantStore;
use crate::conversation::ConversationService;
use crate::session::SessionManager;
use parley_core::error::Result;
use parley_core::record::{ChatResponse, SessionConfig};
use parley_core::settings::Settings;
use parley_core::transport::ChatTransport;
use parley_infrastructure::StoreFactory;
use std::path::Path;
use std::sync::Arc;

/// Every UI-facing service of one data directory.
pub struct AppServices {
    pub conversation: ConversationService,
    /// Shares its active-session pointer with `conversation`
    pub assistants: AssistantStore,
}

impl AppServices {
    /// Opens (and upgrades, if needed) every store under `data_dir`.
    ///
    /// # Errors
    ///
    /// Fails when a store descriptor is invalid. Databases themselves are
    /// opened lazily on first use.
    pub fn open(
        settings: &Settings,
        data_dir: &Path,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self> {
        let factory = StoreFactory::new(data_dir, settings.clone());
        Self::from_factory(&factory, settings, transport)
    }

    pub fn from_factory(
        factory: &StoreFactory,
        settings: &Settings,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self> {
        let placeholder = settings.stream.placeholder_name.as_str();

        let chat = SessionManager::new(factory.chat()?, placeholder);
        let assistants = AssistantStore::new(factory.assistants()?, placeholder);
        let conversation = ConversationService::new(
            transport,
            chat,
            assistants.clone(),
            settings.stream.debounce(),
        );

        tracing::debug!(data_dir = %factory.registry().data_dir().display(), "Services ready");
        Ok(Self {
            conversation,
            assistants,
        })
    }

    /// The chat session manager.
    pub fn chats(&self) -> &SessionManager<ChatResponse, SessionConfig> {
        self.conversation.sessions()
    }
}
