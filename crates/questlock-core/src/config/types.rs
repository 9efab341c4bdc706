//! Configuration type definitions

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub lock: LockConfig,
}

/// Main data pool: ordinary request transactions, sequence counters, quests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Dedicated lock channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LockConfig {
    pub backend: LockBackendKind,
    /// Ignored by the `local` backend.
    pub url: String,
    pub pool_size: u32,
    /// Bound on waiting for a free session in the channel.
    pub checkout_timeout_ms: u64,
    /// Signed so a negative value can be reported instead of wrapping.
    pub default_timeout_secs: i64,
    /// SQLite backend only.
    pub poll_interval_ms: u64,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LockBackendKind {
    #[default]
    Sqlite,
    #[serde(rename = "mysql")]
    #[strum(serialize = "mysql")]
    MySql,
    Local,
}
