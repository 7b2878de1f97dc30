//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/lifetree/lifetree.toml`
//! 3. Environment variables: `LIFETREE_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::{DEFAULT_ID_ATTEMPTS, DEFAULT_MAX_TICKS};

/// Query evaluation limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    /// Node visits one query invocation may make
    pub max_ticks: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_ticks: DEFAULT_MAX_TICKS,
        }
    }
}

/// Id allocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IdConfig {
    /// Candidates drawn before allocation gives up
    pub attempts: usize,
    /// Fixed seed for reproducible ids
    pub seed: Option<u64>,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ID_ATTEMPTS,
            seed: None,
        }
    }
}

/// Raw settings for intermediate parsing (`None` means "not specified").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub data_file: Option<PathBuf>,
    pub search: RawSearchConfig,
    pub ids: RawIdConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSearchConfig {
    pub max_ticks: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawIdConfig {
    pub attempts: Option<usize>,
    pub seed: Option<u64>,
}

/// Unified configuration for lifetree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Outline file the CLI reads and writes
    pub data_file: PathBuf,
    pub search: SearchConfig,
    pub ids: IdConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            search: SearchConfig::default(),
            ids: IdConfig::default(),
        }
    }
}

fn default_data_file() -> PathBuf {
    ProjectDirs::from("", "", "lifetree")
        .map(|dirs| dirs.data_dir().join("life.toml"))
        .unwrap_or_else(|| PathBuf::from("~/.lifetree/life.toml"))
}

/// Get the XDG config directory for lifetree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "lifetree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("lifetree.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Expand `~`, `$VAR` and `${VAR}` in the data file path.
    fn expand_paths(&mut self) {
        let raw = self.data_file.to_string_lossy().to_string();
        let expanded = shellexpand::full(&raw)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| shellexpand::tilde(&raw).into_owned());
        self.data_file = PathBuf::from(expanded);
    }

    /// Overlay wins wherever it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            data_file: overlay
                .data_file
                .clone()
                .unwrap_or_else(|| self.data_file.clone()),
            search: SearchConfig {
                max_ticks: overlay.search.max_ticks.unwrap_or(self.search.max_ticks),
            },
            ids: IdConfig {
                attempts: overlay.ids.attempts.unwrap_or(self.ids.attempts),
                seed: overlay.ids.seed.or(self.ids.seed),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// `config_file` replaces the global config file when given.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        let path = config_file
            .map(Path::to_path_buf)
            .or_else(global_config_path);
        if let Some(path) = path {
            if path.exists() {
                let raw = load_raw_settings(&path)?;
                current = current.merge_with(&raw);
            } else if config_file.is_some() {
                return Err(ApplicationError::Config {
                    message: format!("config file not found: {}", path.display()),
                });
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();
        current.validate()?;
        Ok(current)
    }

    /// Apply LIFETREE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("LIFETREE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("data_file") {
            settings.data_file = PathBuf::from(val);
        }
        if let Ok(val) = config.get_string("search.max_ticks") {
            settings.search.max_ticks = parse_number("search.max_ticks", &val)?;
        }
        if let Ok(val) = config.get_string("ids.attempts") {
            settings.ids.attempts = parse_number("ids.attempts", &val)?;
        }
        if let Ok(val) = config.get_string("ids.seed") {
            settings.ids.seed = Some(parse_number("ids.seed", &val)?);
        }
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ApplicationError> {
        if self.search.max_ticks == 0 {
            return Err(ApplicationError::Config {
                message: "search.max_ticks must be at least 1".to_string(),
            });
        }
        if self.ids.attempts == 0 {
            return Err(ApplicationError::Config {
                message: "ids.attempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        format!(
            r#"# lifetree configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/lifetree/lifetree.toml
#   Env:    LIFETREE_* environment variables, nested keys joined by "__"
#           (LIFETREE_SEARCH__MAX_TICKS=5000)

# Outline file read and written by the CLI (~ and $VAR are expanded)
# data_file = "~/.local/share/lifetree/life.toml"

[search]
# Node visits a single query may make before it is abandoned
# max_ticks = {DEFAULT_MAX_TICKS}

[ids]
# Random id candidates tried before giving up
# attempts = {DEFAULT_ID_ATTEMPTS}

# Fixed seed for reproducible ids
# seed = 42
"#
        )
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ApplicationError> {
    value.trim().parse().map_err(|_| ApplicationError::Config {
        message: format!("{key}: '{value}' is not a number"),
    })
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
