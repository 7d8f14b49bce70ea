//! Physical collection descriptors.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Identifies one physical collection: `(db_name, version, collection_name)`.
///
/// Instances are plain values handed to store constructors; nothing in the
/// workspace keeps a global registry of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreConfig {
    pub db_name: String,
    pub version: u32,
    pub collection_name: String,
}

impl StoreConfig {
    pub fn new(db_name: impl Into<String>, version: u32, collection_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            version,
            collection_name: collection_name.into(),
        }
    }
}

/// The logical storage areas of the application.
///
/// Each area owns its own `(db_name, version)` pair, so bumping one area's
/// version never triggers a migration in another.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StoreArea {
    Chat,
    Summarize,
    Brainstorm,
    Assistants,
    AssistantHistory,
}

impl StoreArea {
    /// Built-in descriptor for the area.
    ///
    /// Chat is at version 2: version 1 stored answers as `[user, answer, tokens]`
    /// tuples.
    pub fn default_config(self) -> StoreConfig {
        match self {
            StoreArea::Chat => StoreConfig::new("parley-chat", 2, "sessions"),
            StoreArea::Summarize => StoreConfig::new("parley-summarize", 1, "sessions"),
            StoreArea::Brainstorm => StoreConfig::new("parley-brainstorm", 1, "sessions"),
            StoreArea::Assistants => StoreConfig::new("parley-assistants", 1, "assistants"),
            StoreArea::AssistantHistory => {
                StoreConfig::new("parley-assistant-history", 1, "history")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_every_area_has_its_own_database() {
        let names: HashSet<String> = StoreArea::iter()
            .map(|area| area.default_config().db_name)
            .collect();
        assert_eq!(names.len(), StoreArea::iter().count());
    }

    #[test]
    fn test_area_names_round_trip_through_strings() {
        assert_eq!(StoreArea::AssistantHistory.to_string(), "assistant_history");
        assert_eq!(StoreArea::from_str("chat").unwrap(), StoreArea::Chat);
    }
}
