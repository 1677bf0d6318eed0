// src/error.rs
//
// Error taxonomy for adaptfx.
// - configuration errors: rejected once by Config::validate, before any grid
//   is built
// - input errors: bad sparing-factor histories, session indices, cohorts
// - numeric errors: a solve produced a non-finite result
// - config loading: I/O and JSON parse failures

use thiserror::Error;

/// Top-level error type for adaptfx.
#[derive(Debug, Error)]
pub enum AdaptError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("sparing-factor history has {got} entries, expected {expected}")]
    HistoryLength { expected: usize, got: usize },

    #[error("numeric error: {0}")]
    Numeric(String),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl AdaptError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub(crate) fn input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True for errors the caller caused by passing bad parameters.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::InvalidInput(_) | Self::HistoryLength { .. }
        )
    }
}

/// Result type alias for adaptfx.
pub type Result<T> = std::result::Result<T, AdaptError>;
