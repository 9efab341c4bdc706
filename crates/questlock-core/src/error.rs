//! Error types for Questlock with categorization:
//!
//! - **Validation errors**: input and configuration (exit code 1)
//! - **System errors**: IO, lock channel availability (exit code 2)
//! - **Not found** (exit code 3)
//! - **Execution errors**: database, lock infrastructure (exit code 4)
//! - **Lock timeout**: contention, retryable by the caller (exit code 5)

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the lock core and its collaborators.
///
/// Callers of [`crate::lock::UserLockManager::execute_with_lock`] use their own
/// error type; it only needs `From<Error>` so lock failures can be folded in.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Configuration value rejected (includes negative lock timeouts).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Caller-supplied input rejected before any work was attempted.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The named lock was held elsewhere for the whole wait window.
    #[error("timed out after {timeout_secs}s waiting for lock '{name}'")]
    LockTimeout {
        /// Lock name that could not be acquired.
        name: String,
        /// Wait bound that elapsed.
        timeout_secs: u64,
    },

    /// Acquire or borrow failed for reasons other than contention.
    #[error("lock infrastructure failure on '{name}': {reason}")]
    LockInfrastructure {
        /// Lock name being acquired.
        name: String,
        /// Underlying channel or driver failure.
        reason: String,
    },

    /// The dedicated lock channel could not hand out a session.
    #[error("lock channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Database failure outside of lock acquisition.
    #[error("database error: {0}")]
    DatabaseError(String),

    /// Malformed file or value.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Create a configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an input validation error.
    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a database error.
    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    /// Create a parse error.
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create an IO error.
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::IoError(msg.into())
    }

    /// Create a lock infrastructure error for `name`.
    pub fn lock_infrastructure(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LockInfrastructure {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::LockTimeout { .. } => "LOCK_TIMEOUT",
            Self::LockInfrastructure { .. } => "LOCK_INFRASTRUCTURE",
            Self::ChannelUnavailable(_) => "CHANNEL_UNAVAILABLE",
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::IoError(_) => "IO_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
        }
    }

    /// Returns the process exit code for this error.
    ///
    /// - 1: validation, bad input, bad configuration
    /// - 2: system (IO, channel unavailable)
    /// - 3: not found
    /// - 4: execution (database, lock infrastructure)
    /// - 5: lock timeout
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig(_) | Self::ValidationError(_) | Self::ParseError(_) => 1,
            Self::IoError(_) | Self::ChannelUnavailable(_) => 2,
            Self::NotFound(_) => 3,
            Self::DatabaseError(_) | Self::LockInfrastructure { .. } => 4,
            Self::LockTimeout { .. } => 5,
        }
    }

    /// Whether a caller may reasonably retry (with backoff).
    ///
    /// The lock manager itself never retries.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::ChannelUnavailable(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io_error(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::parse_error(format!("Failed to parse config: {err}"))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::database_error(err.to_string())
    }
}
