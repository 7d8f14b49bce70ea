use crate::store_config::{StoreArea, StoreConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root of `config.toml`. Every section is optional.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Overrides the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Keyed by area name, e.g. `[stores.chat]`.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub stores: HashMap<String, StoreOverride>,
    pub stream: StreamSettings,
    pub backend: BackendSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Descriptor for `area`: the built-in default with any configured
    /// fields replaced.
    pub fn store_config(&self, area: StoreArea) -> StoreConfig {
        let mut config = area.default_config();
        if let Some(overrides) = self.stores.get(area.as_ref()) {
            if let Some(db_name) = &overrides.db_name {
                config.db_name = db_name.clone();
            }
            if let Some(version) = overrides.version {
                config.version = version;
            }
            if let Some(collection_name) = &overrides.collection_name {
                config.collection_name = collection_name.clone();
            }
        }
        config
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StreamSettings {
    /// Leading-debounce window for UI updates while a response streams.
    pub debounce_ms: u64,
    /// Shown for sessions that were never named.
    pub placeholder_name: String,
}

impl StreamSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            placeholder_name: "New chat".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            default_model: None,
            temperature: 0.7,
            max_tokens: 2048,
            stream: true,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Also write a daily-rolling log file under the data directory.
    pub file: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.stream.debounce(), Duration::from_millis(100));
        assert_eq!(settings.stream.placeholder_name, "New chat");
    }

    #[test]
    fn test_store_overrides() {
        let settings: Settings = toml::from_str(
            r#"
            [stores.chat]
            version = 3

            [stores.assistants]
            db_name = "bots"
            collection_name = "bots"
            "#,
        )
        .unwrap();

        let chat = settings.store_config(StoreArea::Chat);
        assert_eq!(chat.version, 3);
        assert_eq!(chat.db_name, StoreArea::Chat.default_config().db_name);

        let bots = settings.store_config(StoreArea::Assistants);
        assert_eq!(bots.db_name, "bots");
        assert_eq!(bots.collection_name, "bots");
        assert_eq!(
            settings.store_config(StoreArea::Summarize),
            StoreArea::Summarize.default_config()
        );
    }

    #[test]
    fn test_partial_sections() {
        let settings: Settings = toml::from_str(
            r#"
            [backend]
            base_url = "https://chat.example.com/api"
            stream = false

            [logging]
            file = true
            "#,
        )
        .unwrap();
        assert_eq!(settings.backend.base_url, "https://chat.example.com/api");
        assert!(!settings.backend.stream);
        assert_eq!(settings.backend.max_tokens, 2048);
        assert!(settings.logging.file);
        assert_eq!(settings.logging.level, "info");
    }
}
