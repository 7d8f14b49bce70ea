//! Session updater helper for common update patterns.
//!
//! This module provides `SessionUpdater` which abstracts the common
//! "find → update → save" pattern used by targeted field updates.

use parley_core::error::Result;
use parley_core::record::DbObject;
use parley_core::store::{Document, RecordStore};

/// Applies a field update to one stored session.
///
/// The store stamps `last_edited` and `rev` after the updater runs.
pub struct SessionUpdater<R, C> {
    store: RecordStore<R, C>,
}

impl<R: Document, C: Document + Default> SessionUpdater<R, C> {
    pub fn new(store: RecordStore<R, C>) -> Self {
        Self { store }
    }

    /// Updates a session by applying the given updater function.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The session doesn't exist
    /// - The updater function returns an error
    /// - Saving to storage fails
    pub async fn update<F>(&self, session_id: &str, updater: F) -> Result<DbObject<R, C>>
    where
        F: FnOnce(&mut DbObject<R, C>) -> Result<()>,
    {
        tracing::debug!(session_id, "[SessionUpdater] update() called");

        let (session, ()) = self.store.modify(session_id, updater).await?;

        tracing::debug!(
            session_id,
            name = ?session.name,
            favorite = session.is_favorite(),
            rev = session.rev,
            "[SessionUpdater] Session saved"
        );
        Ok(session)
    }
}
