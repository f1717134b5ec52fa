use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::*;
use crate::error::{PanelError, Result};
use crate::pipeline::SourcePaths;
use crate::storage::compression::CompressionCache;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub compression: CompressionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub indicators: PathBuf,
    pub events: PathBuf,
    pub fused: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// xz preset, 0-9
    pub preset: u32,
    /// Recompress the fused output after every rebuild
    pub refresh_on_rebuild: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            compression: CompressionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            indicators: PathBuf::from(DEFAULT_INDICATORS_CSV),
            events: PathBuf::from(DEFAULT_EVENTS_CSV),
            fused: PathBuf::from(DEFAULT_FUSED_CSV),
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            preset: DEFAULT_XZ_PRESET,
            refresh_on_rebuild: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `panel.toml` in the working
    /// directory when no path is given. An explicit path must exist; the
    /// default file is optional. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    PanelError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
                })?;
                Self::from_toml_str(&content)?
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_toml_str(&fs::read_to_string(default_path)?)?
                } else {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `UNREST_*` overrides using `lookup` as the environment.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("UNREST_INDICATORS_CSV") {
            self.paths.indicators = PathBuf::from(v);
        }
        if let Some(v) = lookup("UNREST_EVENTS_CSV") {
            self.paths.events = PathBuf::from(v);
        }
        if let Some(v) = lookup("UNREST_FUSED_CSV") {
            self.paths.fused = PathBuf::from(v);
        }
        if let Some(v) = lookup("UNREST_LOG_DIR") {
            self.logging.dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("UNREST_XZ_PRESET") {
            self.compression.preset = v.trim().parse().map_err(|_| {
                PanelError::Config(format!("UNREST_XZ_PRESET must be an integer, got '{}'", v))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.compression.preset > 9 {
            return Err(PanelError::Config(format!(
                "compression preset must be between 0 and 9, got {}",
                self.compression.preset
            )));
        }
        Ok(())
    }

    pub fn source_paths(&self) -> SourcePaths {
        SourcePaths {
            indicators: self.paths.indicators.clone(),
            events: self.paths.events.clone(),
            fused: self.paths.fused.clone(),
        }
    }

    pub fn cache(&self) -> CompressionCache {
        CompressionCache::new(self.compression.preset)
    }
}
