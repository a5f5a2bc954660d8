//! Unified error handling for the jurisharvest crate
//!
//! Domain modules define their own error enums ([`ConfigError`], [`FetchError`],
//! [`StoreError`]); this module folds them into a single [`Error`] so that
//! callers crossing module boundaries only need one `Result` type.
//!
//! Failures that happen *inside* a harvesting run are never surfaced through
//! this type. They are conveyed as status signals and counters instead.

use std::io;
use thiserror::Error;

pub use crate::collector::FetchError;
pub use crate::config::ConfigError;
pub use crate::storage::StoreError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Document store errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Serialization errors
    Parsing,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short lowercase label, used as a metrics/log field value
    pub fn label(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Parsing => "parsing",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the jurisharvest crate
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid task or process configuration
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Collector (HTTP fetch) errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Document store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Fetch(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Other(_) => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Config,
            Self::Fetch(_) => ErrorCategory::Network,
            Self::Store(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Other(_) => ErrorCategory::Other,
        }
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other(context.into())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
