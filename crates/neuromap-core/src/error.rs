//! Error types for Neuromap

use thiserror::Error;

/// Result type alias using Neuromap's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Neuromap error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Validation errors (E100-E199)
    #[error("Validation error: {0}")]
    Validation(String),

    // Lookup errors (E200-E299)
    #[error("Not found: {0}")]
    NotFound(String),

    // Upstream collaborator errors (E300-E399)
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Timeout: {operation} did not complete within {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // Computation errors (E400-E499)
    #[error("Computation error: {0}")]
    Computation(String),

    // Concurrency errors (E500-E599)
    #[error("Lock timeout: mind map '{0}' is being modified by another operation. Try again later.")]
    LockTimeout(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn computation(msg: impl Into<String>) -> Self {
        Self::Computation(msg.into())
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E100",
            Self::NotFound(_) => "E200",
            Self::Upstream(_) => "E300",
            Self::Timeout { .. } => "E301",
            Self::Computation(_) => "E400",
            Self::LockTimeout(_) => "E500",
            Self::Cancelled(_) => "E501",
            Self::ConfigError(_) => "E600",
            Self::Io(_) => "E9999",
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    ///
    /// The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Upstream(_) | Self::Timeout { .. } | Self::LockTimeout(_)
        )
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NotFound(_) => Some("neuromap generate --graph <file> --context <name>".to_string()),
            Self::Timeout { timeout_ms, .. } => Some(format!(
                "neuromap config set expansion.timeout_secs {}",
                (timeout_ms / 1000).max(1) * 2
            )),
            Self::ConfigError(_) => Some("neuromap config list".to_string()),
            _ => None,
        }
    }
}
