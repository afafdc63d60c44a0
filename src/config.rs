//! Application configuration management.
//!
//! Settings are layered with `figment`, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. A TOML file: `--config PATH`, or `config.toml` in the platform config
//!    directory
//! 3. Environment variables prefixed with `IMGDEDUP_` (e.g. `IMGDEDUP_IO_THREADS=8`)
//! 4. Command-line flags, applied by the caller after loading

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scanner::{ScanOptions, WalkerConfig, DEFAULT_IMAGE_EXTENSIONS};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "IMGDEDUP_";

/// Errors loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A layer could not be read or did not match the expected shape.
    #[error("invalid configuration: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// The platform directories could not be determined.
    #[error("cannot determine the platform config and data directories")]
    NoProjectDirs,

    /// The configuration could not be rendered as TOML.
    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Reading or writing the file failed.
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Index database. Defaults to `index.db` in the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,

    /// Files per lookup/hash/write round during a scan.
    pub batch_size: usize,

    /// Hashing threads.
    pub io_threads: usize,

    /// Capacity of the progress event channel.
    pub progress_buffer: usize,

    /// Default destination for `--trash-dir` style disposal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trash_dir: Option<PathBuf>,

    /// Follow symbolic links while walking.
    pub follow_symlinks: bool,

    /// Skip dot-files and dot-directories.
    pub skip_hidden: bool,

    /// Gitignore-style patterns excluded from scans.
    pub ignore_patterns: Vec<String>,

    /// Extensions treated as images.
    pub extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: None,
            batch_size: 50,
            io_threads: 4,
            progress_buffer: 200,
            trash_dir: None,
            follow_symlinks: false,
            skip_hidden: false,
            ignore_patterns: Vec::new(),
            extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Load defaults, then the config file, then the environment.
    ///
    /// With `path` set, that file is used instead of the platform default.
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error when a layer is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().ok(),
        };
        Self::figment(file.as_deref())
            .extract()
            .map_err(|e| ConfigError::Figment(Box::new(e)))
    }

    /// The layered provider chain behind [`Config::load`].
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            log::debug!("Reading configuration from {}", file.display());
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = self.to_toml()?;
        fs::write(path, content).map_err(io_err)?;
        log::info!("Wrote configuration to {}", path.display());
        Ok(())
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented in TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Platform-specific location of `config.toml`.
    ///
    /// # Errors
    ///
    /// Fails when no home directory can be found.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Platform-specific location of the index database.
    ///
    /// # Errors
    ///
    /// Fails when no home directory can be found.
    pub fn default_database() -> Result<PathBuf, ConfigError> {
        Ok(project_dirs()?.data_dir().join("index.db"))
    }

    /// The configured database, or the platform default.
    ///
    /// # Errors
    ///
    /// Fails when no database is configured and no home directory can be found.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Self::default_database(),
        }
    }

    /// Scan tuning derived from this configuration.
    #[must_use]
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            batch_size: self.batch_size.max(1),
            io_threads: self.io_threads.max(1),
            walker: WalkerConfig {
                follow_symlinks: self.follow_symlinks,
                skip_hidden: self.skip_hidden,
                ignore_patterns: self.ignore_patterns.clone(),
                ..WalkerConfig::default()
            }
            .with_extensions(&self.extensions),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("com", "imgdedup", "imgdedup").ok_or(ConfigError::NoProjectDirs)
}
