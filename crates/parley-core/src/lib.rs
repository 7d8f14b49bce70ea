pub mod backend;
pub mod clock;
pub mod error;
pub mod listing;
pub mod namespace;
pub mod record;
pub mod settings;
pub mod store;
pub mod store_config;
pub mod stream;
pub mod transport;

// Re-export common types
pub use error::{ParleyError, Result};
pub use record::{DbMessage, DbObject, Timestamp};
pub use store::RecordStore;
pub use store_config::{StoreArea, StoreConfig};
