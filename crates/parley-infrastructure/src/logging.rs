//! Tracing subscriber setup.
//!
//! Logs go to stderr and, when enabled, to a daily-rolling file under
//! `<data_dir>/logs/`. `RUST_LOG` overrides the configured level.

use crate::paths::ParleyPaths;
use parley_core::error::Result;
use parley_core::settings::LoggingSettings;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global subscriber.
///
/// Returns the file writer guard when file logging is enabled; keep it alive
/// for the lifetime of the process or buffered lines are lost. Calling this
/// twice keeps the first subscriber.
pub fn init_logging(settings: &LoggingSettings, data_dir: &Path) -> Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter());

    let (file_layer, guard) = if settings.file {
        let log_dir = ParleyPaths::log_dir(data_dir);
        std::fs::create_dir_all(&log_dir)?;
        let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "parley.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(filter());
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let installed = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    match installed {
        Ok(()) => tracing::debug!(level = %settings.level, file = settings.file, "Logging initialized"),
        Err(e) => tracing::debug!(error = %e, "Tracing subscriber already installed"),
    }
    Ok(guard)
}
