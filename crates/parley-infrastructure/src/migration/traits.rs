//! Core traits for collection migrations.

use serde_json::Value;

/// Version information and metadata about a migration step.
pub trait Migration: Send + Sync {
    /// Schema version this migration starts from.
    fn from_version(&self) -> u32;

    /// Schema version this migration produces.
    fn to_version(&self) -> u32;

    /// Whether this step applies to documents stored at `version`.
    fn can_migrate(&self, version: u32) -> bool {
        version == self.from_version()
    }

    /// Human-readable description, used for logging.
    fn description(&self) -> &str;
}

/// A migration that rewrites every stored document of a collection.
///
/// `migrate` must be total over the shapes that can exist at
/// `from_version()`: an error aborts the whole database upgrade.
pub trait RecordMigration: Migration + std::fmt::Debug {
    fn migrate(&self, record: Value) -> anyhow::Result<Value>;
}
