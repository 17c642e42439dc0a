//! Configuration service implementation.
//!
//! Loads `FrontdeskConfig` from, in order of preference, an explicit path,
//! the `FRONTDESK_CONFIG` environment variable or
//! `~/.config/frontdesk/config.toml`, then applies environment overrides.

use crate::paths::FrontdeskPaths;
use frontdesk_core::config::FrontdeskConfig;
use frontdesk_core::error::{FrontdeskError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

pub const ENV_CONFIG_PATH: &str = "FRONTDESK_CONFIG";
pub const ENV_BIND: &str = "FRONTDESK_BIND";
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_EXTRACTION_MODEL: &str = "FRONTDESK_EXTRACTION_MODEL";
pub const ENV_HANDLER_BASE_URL: &str = "FRONTDESK_HANDLER_BASE_URL";

/// Configuration service that loads and caches the configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    /// Explicit config file, overriding the environment and default location
    path: Option<PathBuf>,
    /// Cached configuration loaded from file.
    config: Arc<RwLock<Option<FrontdeskConfig>>>,
}

impl ConfigService {
    /// Creates a new ConfigService using the default file resolution.
    ///
    /// The configuration is loaded lazily on first access.
    pub fn new() -> Self {
        Self {
            path: None,
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Creates a ConfigService bound to an explicit config file.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets the configuration, loading from file if not cached.
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is
    /// an error.
    pub fn get_config(&self) -> Result<FrontdeskConfig> {
        {
            let read_lock = self.config.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(ref cached) = *read_lock {
                return Ok(cached.clone());
            }
        }

        let path = self.config_path()?;
        let mut loaded = Self::load_file(&path)?;
        apply_env_overrides(&mut loaded, |key| std::env::var(key).ok());

        {
            let mut write_lock = self.config.write().unwrap_or_else(PoisonError::into_inner);
            *write_lock = Some(loaded.clone());
        }

        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut write_lock = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *write_lock = None;
    }

    /// The file this service reads.
    pub fn config_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        if let Some(path) = std::env::var_os(ENV_CONFIG_PATH).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        FrontdeskPaths::config_file().map_err(|e| FrontdeskError::config(e.to_string()))
    }

    fn load_file(path: &Path) -> Result<FrontdeskConfig> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "[ConfigService] no config at {}, using defaults",
                    path.display()
                );
                return Ok(FrontdeskConfig::default());
            }
            Err(e) => {
                return Err(FrontdeskError::config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let config: FrontdeskConfig = toml::from_str(&content).map_err(|e| {
            FrontdeskError::config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        tracing::debug!("[ConfigService] loaded {}", path.display());
        Ok(config)
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies environment overrides. Empty values are ignored.
pub fn apply_env_overrides(config: &mut FrontdeskConfig, lookup: impl Fn(&str) -> Option<String>) {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(bind) = var(ENV_BIND) {
        config.server.bind_address = bind;
    }
    if let Some(key) = var(ENV_API_KEY) {
        config.extraction.api_key = Some(key);
    }
    if let Some(model) = var(ENV_EXTRACTION_MODEL) {
        config.extraction.model = model;
    }
    if let Some(url) = var(ENV_HANDLER_BASE_URL) {
        config.handlers.base_url = Some(url);
    }
}
