pub mod logging;
pub mod migration;
pub mod paths;
pub mod settings_service;
pub mod sqlite;
pub mod stores;
pub mod transport;

pub use crate::paths::ParleyPaths;
pub use crate::settings_service::SettingsService;
pub use crate::sqlite::{ConnectionRegistry, SqliteCollection};
pub use crate::stores::StoreFactory;
pub use crate::transport::ReqwestTransport;
