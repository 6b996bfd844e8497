//! Configuration file loading and path resolution
//!
//! Paths follow a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. OS-dependent default location (only if the file exists)
//! 4. Compiled defaults (no file at all)
//!
//! A missing configuration file is never fatal: a warning is logged and
//! compiled defaults are used. A file that exists but does not parse is an
//! error.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming the channel configuration file
pub const CONFIG_ENV_VAR: &str = "KTV_CONFIG";

/// Environment variable naming the content catalog file
pub const CATALOG_ENV_VAR: &str = "KTV_CATALOG";

/// Environment variable naming the persisted state file
pub const STATE_ENV_VAR: &str = "KTV_STATE";

const APP_DIR: &str = "ktv";

/// Logging section shared by every KTV binary
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Resolve the configuration file path.
///
/// Returns `None` when neither the CLI nor the environment names a file and
/// no file exists at the default locations.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Some(path) = env_path(env_var_name) {
        return Some(path);
    }

    // Priority 3: OS-dependent default
    default_config_candidates().into_iter().find(|p| p.exists())
}

/// Resolve a data file (catalog, state) that has an OS-dependent default
/// under the user's local data directory.
pub fn resolve_data_path(cli_arg: Option<&Path>, env_var_name: &str, file_name: &str) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Some(path) = env_path(env_var_name) {
        return path;
    }

    default_data_dir().join(file_name)
}

/// OS-dependent data directory (`~/.local/share/ktv` on Linux)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./ktv_data"))
}

fn env_path(env_var_name: &str) -> Option<PathBuf> {
    match std::env::var(env_var_name) {
        Ok(value) if !value.trim().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}

fn default_config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(APP_DIR).join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc/ktv/config.toml"));
    }
    candidates
}

/// Load and parse a TOML file, falling back to `T::default()` when there is
/// no file to load.
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No configuration file found, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Configuration file {} not found, using compiled defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let value = load_toml_file(path)?;
    info!("Loaded configuration from {}", path.display());
    Ok(value)
}

/// Load and parse a TOML file that must exist
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
    Ok(toml::from_str(&text)?)
}
