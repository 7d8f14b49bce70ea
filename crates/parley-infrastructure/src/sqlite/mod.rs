//! SQLite persistence for record collections.

pub mod collection;
pub mod registry;

pub use collection::SqliteCollection;
pub use registry::{ConnectionRegistry, SharedConnection, UpgradeContext, UpgradeHook};

use parley_core::error::{ParleyError, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| ParleyError::internal("sqlite connection mutex poisoned"))
}

pub(crate) fn db_error(err: rusqlite::Error) -> ParleyError {
    ParleyError::database(err.to_string())
}

/// Table names are interpolated into SQL, so only `[A-Za-z0-9_]` is allowed.
pub fn validate_table_name(name: &str) -> Result<()> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ParleyError::config(format!(
            "invalid collection name '{name}': use letters, digits and '_'"
        )))
    }
}

/// Creates the document table backing `collection` if it is missing.
pub fn create_collection_table(conn: &Connection, collection: &str) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{collection}\" (
            id TEXT PRIMARY KEY,
            body TEXT NOT NULL
        );"
    ))
}
