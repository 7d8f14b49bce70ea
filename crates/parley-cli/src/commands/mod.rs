pub mod ask;
pub mod assistants;
pub mod config;
pub mod sessions;

use anyhow::{Context as _, Result};
use parley_application::AppServices;
use parley_core::settings::Settings;
use parley_infrastructure::logging::init_logging;
use parley_infrastructure::{ParleyPaths, ReqwestTransport, SettingsService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

pub fn settings_service(path: Option<&Path>) -> Result<SettingsService> {
    match path {
        Some(path) => Ok(SettingsService::at(path)),
        None => SettingsService::new().context("Failed to locate the settings file"),
    }
}

/// Everything a session command needs.
pub struct Context {
    pub settings: Settings,
    pub services: AppServices,
    /// Keeps the file logger flushing until the command finishes
    _log_guard: Option<WorkerGuard>,
}

impl Context {
    pub fn open(config: Option<&Path>, data_dir: Option<PathBuf>) -> Result<Self> {
        let settings = settings_service(config)?
            .load()
            .context("Failed to load settings")?;
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => ParleyPaths::resolve_data_dir(settings.data_dir.as_deref())?,
        };

        let guard = init_logging(&settings.logging, &data_dir)?;
        let transport = Arc::new(ReqwestTransport::from_settings(&settings.backend));
        let services = AppServices::open(&settings, &data_dir, transport)
            .with_context(|| format!("Failed to open stores in {}", data_dir.display()))?;

        tracing::debug!(data_dir = %data_dir.display(), "CLI context ready");
        Ok(Self {
            settings,
            services,
            _log_guard: guard,
        })
    }
}
