//! Configuration loading from files and environment

use std::path::{Path, PathBuf};

use super::{merge::merge_tables, types::Config};
use crate::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration from all sources with hierarchy.
///
/// `explicit` is the `--config` file; unlike the global and project files it
/// must exist.
///
/// # Errors
///
/// Returns error if:
/// - A config file is malformed TOML or has wrongly typed values
/// - The explicit config file is missing
/// - An environment override cannot be parsed
/// - The merged values fail validation
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut layers: Vec<PathBuf> = Vec::new();

    if let Some(global) = global_config_path().filter(|path| path.is_file()) {
        layers.push(global);
    }

    let project = project_config_path()?;
    if project.is_file() {
        layers.push(project);
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::io_error(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        layers.push(path.to_path_buf());
    }

    let merged = layers
        .iter()
        .try_fold(toml::Table::new(), |acc, path| {
            load_toml_table(path).map(|table| merge_tables(acc, table))
        })?;

    tracing::debug!(layers = ?layers, "loaded configuration files");

    let config: Config = toml::Value::Table(merged).try_into()?;
    let config = config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

// ═══════════════════════════════════════════════════════════════════════════
// PATH HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Get path to global config file
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "questlock")
        .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
}

/// Get path to project config file
///
/// # Errors
///
/// Returns error if current directory cannot be determined
pub fn project_config_path() -> Result<PathBuf> {
    std::env::current_dir()
        .map(|dir| dir.join(".questlock/config.toml"))
        .map_err(|e| Error::io_error(format!("Failed to get current directory: {e}")))
}

/// Read one TOML file as an untyped table, ready for merging.
///
/// # Errors
///
/// Returns error if the path is a directory, cannot be read, or is not TOML.
pub fn load_toml_table(path: &Path) -> Result<toml::Table> {
    if path.is_dir() {
        return Err(Error::io_error(format!(
            "Config path is a directory, not a file: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::io_error(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;

    content.parse::<toml::Table>().map_err(|e| {
        Error::parse_error(format!(
            "Failed to parse config file {}: {e}",
            path.display()
        ))
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// ENVIRONMENT VARIABLE OVERRIDES
// ═══════════════════════════════════════════════════════════════════════════

impl Config {
    /// Apply `QUESTLOCK_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns error if an override value cannot be parsed
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("QUESTLOCK_DATABASE_URL") {
            self.database.url = value;
        }

        if let Some(value) = lookup("QUESTLOCK_LOCK_BACKEND") {
            self.lock.backend = value.parse().map_err(|_| {
                Error::invalid_config(format!(
                    "Invalid QUESTLOCK_LOCK_BACKEND value '{value}' (expected sqlite, mysql or local)"
                ))
            })?;
        }

        if let Some(value) = lookup("QUESTLOCK_LOCK_URL") {
            self.lock.url = value;
        }

        if let Some(value) = lookup("QUESTLOCK_LOCK_POOL_SIZE") {
            self.lock.pool_size = value.parse().map_err(|e| {
                Error::invalid_config(format!("Invalid QUESTLOCK_LOCK_POOL_SIZE value: {e}"))
            })?;
        }

        if let Some(value) = lookup("QUESTLOCK_LOCK_TIMEOUT_SECS") {
            self.lock.default_timeout_secs = value.parse().map_err(|e| {
                Error::invalid_config(format!("Invalid QUESTLOCK_LOCK_TIMEOUT_SECS value: {e}"))
            })?;
        }

        Ok(self)
    }
}
