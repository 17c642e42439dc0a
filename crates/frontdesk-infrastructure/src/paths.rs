//! Path management for Frontdesk configuration files.
//!
//! ```text
//! ~/.config/frontdesk/         # Config directory (dirs::config_dir)
//! └── config.toml              # Application configuration
//!
//! ~/.local/share/frontdesk/    # Data directory
//! └── ledger.jsonl             # Default call ledger export
//! ```

use std::path::PathBuf;

const APP_DIR: &str = "frontdesk";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Platform directory could not be determined.
    DirNotFound(&'static str),
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::DirNotFound(kind) => write!(f, "Cannot find {} directory", kind),
        }
    }
}

impl std::error::Error for PathError {}

pub struct FrontdeskPaths;

impl FrontdeskPaths {
    /// Returns the Frontdesk configuration directory (e.g. `~/.config/frontdesk/`).
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::DirNotFound("config"))
    }

    /// Returns the Frontdesk data directory (e.g. `~/.local/share/frontdesk/`).
    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::DirNotFound("data"))
    }

    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn default_ledger_file() -> Result<PathBuf, PathError> {
        Ok(Self::data_dir()?.join("ledger.jsonl"))
    }
}
