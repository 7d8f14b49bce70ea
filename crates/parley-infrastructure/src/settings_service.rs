//! Loads [`Settings`] from `config.toml`.

use crate::paths::ParleyPaths;
use parley_core::error::{ParleyError, Result};
use parley_core::settings::Settings;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SettingsService {
    path: PathBuf,
}

impl SettingsService {
    /// Uses the platform config file, e.g. `~/.config/parley/config.toml`.
    pub fn new() -> Result<Self> {
        Ok(Self::at(ParleyPaths::config_file()?))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file; a missing file yields the defaults.
    pub fn load(&self) -> Result<Settings> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No settings file, using defaults");
                return Ok(Settings::default());
            }
            Err(e) => return Err(e.into()),
        };
        let settings: Settings = toml::from_str(&content).map_err(|e| {
            ParleyError::config(format!("{}: {e}", self.path.display()))
        })?;
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(settings)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let service = SettingsService::at(dir.path().join("config.toml"));
        assert_eq!(service.load().unwrap(), Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let service = SettingsService::at(dir.path().join("nested/config.toml"));

        let mut settings = Settings::default();
        settings.stream.debounce_ms = 250;
        settings.backend.default_model = Some("small".to_string());
        service.save(&settings).unwrap();

        assert_eq!(service.load().unwrap(), settings);
    }

    #[test]
    fn test_invalid_file_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "stream = [").unwrap();

        let err = SettingsService::at(path).load().unwrap_err();
        assert!(matches!(err, ParleyError::Config(_)));
    }
}
