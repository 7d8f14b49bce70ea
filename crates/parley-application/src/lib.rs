//! Application layer for Parley.
//!
//! This crate provides the use cases the UI calls: session management, the
//! assistant namespace and the ask-and-persist conversation flow. It
//! coordinates the core record store with infrastructure-provided backends
//! and transports.

pub mod assistant;
pub mod conversation;
pub mod services;
pub mod session;

pub use assistant::{AssistantStore, OwnerDeletion};
pub use conversation::{AskOutcome, ConversationService};
pub use services::AppServices;
pub use session::{SessionManager, SessionSummary, SessionUpdater};
