//! Configuration file discovery and TOML loading
//!
//! Config file resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config directory (`~/.config/<app>/config.toml` on Linux)
//! 4. System config (`/etc/<app>/config.toml`, Linux only)
//!
//! A missing config file is never fatal: callers receive `None` (or the
//! `Default` value of their config type) and fall back to compiled defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolve the config file path following the priority order above
///
/// Explicit paths (CLI or environment) are returned even if the file does not
/// exist, so the caller can warn about them; discovered default locations are
/// returned only if they exist.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    app_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3/4: Platform default locations
    default_config_candidates(app_name)
        .into_iter()
        .find(|p| p.exists())
}

/// Candidate config locations for the current platform, in priority order
pub fn default_config_candidates(app_name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(app_name).join("config.toml"));
    }

    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc").join(app_name).join("config.toml"));
    }

    candidates
}

/// Load a TOML config file into `T`
///
/// - `None` path → `T::default()`
/// - Path that does not exist → warning + `T::default()`
/// - Unreadable or malformed file → `Error::Config`
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        debug!("No config file found, using defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}
