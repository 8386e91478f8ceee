// config.rs - TOML settings with defaults and an env override

use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "WEBP_BATCH_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Initial quality slider value, 1-100.
    pub quality: u8,
    /// Initial longest-side limit in pixels.
    pub max_dimension: u32,
    /// Output size the compressor tries to stay under.
    pub max_size_mb: f64,
    /// Walk sub-directories when a folder is selected or dropped.
    pub recurse_folders: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            max_dimension: 1920,
            max_size_mb: 2.0,
            recurse_folders: true,
        }
    }
}

impl AppConfig {
    /// Loads the user config, falling back to defaults on any problem.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            log::debug!("No config directory available, using defaults");
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(Some(config)) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("webp-batch").join("config.toml"))
    }

    /// Returns `Ok(None)` when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&contents).map(Some)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config.sanitized())
    }

    pub fn sanitized(mut self) -> Self {
        self.quality = self.quality.clamp(1, 100);
        self.max_dimension = self.max_dimension.max(1);
        if !self.max_size_mb.is_finite() || self.max_size_mb <= 0.0 {
            self.max_size_mb = Self::default().max_size_mb;
        }
        self
    }

    pub fn max_size_bytes(&self) -> u64 {
        (self.max_size_mb * 1024.0 * 1024.0) as u64
    }
}
