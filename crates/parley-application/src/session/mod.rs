//! Session application services.
//!
//! This module contains application-layer services for managing sessions:
//! the active-session pointer, message edits, metadata updates and the
//! grouped session list.

mod manager;
mod updater;

pub use manager::{SessionManager, SessionSummary};
pub use updater::SessionUpdater;

pub(crate) use manager::guard;
