//! Platform paths for parley configuration and data.
//!
//! ```text
//! ~/.config/parley/               # Config directory
//! └── config.toml                 # Settings
//!
//! ~/.local/share/parley/          # Data directory (overridable in settings)
//! ├── parley-chat.sqlite3         # One database per store area
//! ├── parley-assistants.sqlite3
//! └── logs/
//!     └── parley.log.YYYY-MM-DD
//! ```

use std::path::PathBuf;

const APP_DIR: &str = "parley";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// The platform directory could not be determined.
    DirNotFound(&'static str),
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::DirNotFound(kind) => write!(f, "Cannot find {kind} directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for parley_core::ParleyError {
    fn from(err: PathError) -> Self {
        parley_core::ParleyError::config(err.to_string())
    }
}

pub struct ParleyPaths;

impl ParleyPaths {
    /// e.g. `~/.config/parley/`
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::DirNotFound("config"))
    }

    /// e.g. `~/.local/share/parley/`
    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::DirNotFound("data"))
    }

    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// The data directory from settings, falling back to the platform one.
    pub fn resolve_data_dir(configured: Option<&std::path::Path>) -> Result<PathBuf, PathError> {
        match configured {
            Some(dir) => Ok(dir.to_path_buf()),
            None => Self::data_dir(),
        }
    }

    pub fn log_dir(data_dir: &std::path::Path) -> PathBuf {
        data_dir.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_configured_data_dir_wins() {
        let dir = ParleyPaths::resolve_data_dir(Some(Path::new("/tmp/parley-data"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/parley-data"));
        assert_eq!(ParleyPaths::log_dir(&dir), PathBuf::from("/tmp/parley-data/logs"));
    }
}
