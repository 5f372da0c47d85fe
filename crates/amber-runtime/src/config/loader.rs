//! Configuration loader using figment.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. Programmatic overrides ([`ConfigLoader::merge`])
//! 3. Profile-specific config file (`amber.{profile}.toml`)
//! 4. Main config file (`amber.toml` or `config.toml`)
//! 5. Environment variables (`AMBER_*`)
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: TOML files (`amber.toml`, `config.toml`)
//! - `yaml-config`: YAML files (`amber.yaml`, `amber.yml`, `config.yaml`, `config.yml`)
//!
//! # Environment Variable Mapping
//!
//! Variables use the `AMBER_` prefix with `__` as the nesting separator:
//!
//! - `AMBER_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `AMBER_RECORDER__INTERVAL_SECS=30` → `recorder.interval_secs = 30`
//! - `AMBER_BOT__SELECTION=highest-priority` → `bot.selection = "highest-priority"`
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::AmberConfig;

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name, accepting the short forms `dev` and `prod`.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `AMBER_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("AMBER_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader reading the profile from the environment.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to the search paths.
    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds `<user config dir>/amber` to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(config_dir) => self.search_path(config_dir.join("amber")),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables environment variables (the default).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a configuration value above the built-in defaults. Files and
    /// environment variables still override it.
    pub fn merge(mut self, config: AmberConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<AmberConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: AmberConfig = figment.extract()?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(AmberConfig::default()))
            .merge(std::mem::take(&mut self.figment));

        let files = match self.config_file.take() {
            Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path)),
            Some(path) => vec![path],
            None => self.locate_files(),
        };
        for path in &files {
            info!(path = %path.display(), "Loading configuration file");
            figment = merge_config_file(figment, path)?;
        }

        if self.load_env {
            trace!("Loading environment variables with AMBER_ prefix");
            figment = figment.merge(Env::prefixed("AMBER_").split("__"));
        }

        Ok(figment)
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }

        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("amber"));
        }
        paths
    }

    /// Walks `search paths x file names` and returns the files to merge,
    /// lowest priority first: any profile variants seen along the way, then
    /// the first base file found.
    fn locate_files(&self) -> Vec<PathBuf> {
        let search_paths = self.resolve_search_paths();
        let mut files = Vec::new();

        for dir in &search_paths {
            for name in config_file_names() {
                if let Some((stem, ext)) = name.rsplit_once('.') {
                    let profiled = dir.join(format!("{stem}.{}.{ext}", self.profile));
                    if profiled.exists() {
                        debug!(path = %profiled.display(), "Found profile-specific config");
                        files.push(profiled);
                    }
                }

                let base = dir.join(name);
                if base.exists() {
                    files.push(base);
                    return files;
                }
            }
        }

        warn!(paths = ?search_paths, "No configuration file found, using defaults");
        files
    }
}

/// File names searched in every directory, in order.
#[allow(unused_mut)]
fn config_file_names() -> Vec<&'static str> {
    let mut names = Vec::new();
    #[cfg(feature = "toml-config")]
    names.extend(["amber.toml", "config.toml"]);
    #[cfg(feature = "yaml-config")]
    names.extend(["amber.yaml", "amber.yml", "config.yaml", "config.yml"]);
    names
}

/// Only extensions enabled via feature flags are accepted.
fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::ParseError(format!(
            "Unsupported or disabled configuration file format: .{ext}"
        ))),
    }
}

/// Loads configuration from the current directory and the environment.
pub fn load_config() -> ConfigResult<AmberConfig> {
    ConfigLoader::new().with_current_dir().load()
}

/// Loads configuration from one file plus the environment.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<AmberConfig> {
    ConfigLoader::new().file(path).load()
}
