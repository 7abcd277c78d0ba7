//! Error types for ideaforge.
//!
//! Taxonomy:
//! - Recoverable: parse failures of model replies. Stages convert these into
//!   safe defaults or retry signals; they never escape the refinement loop.
//! - Fatal: configuration and backend failures (no usable content,
//!   transport, auth). These abort startup or the run.
//! - Invariant: internal errors that indicate a bug.

use thiserror::Error;

/// Top-level error type for ideaforge.
#[derive(Debug, Error)]
pub enum IdeaforgeError {
    // ═══════════════════════════════════════════════════════════════════
    // Recoverable — contained at the stage boundary
    // ═══════════════════════════════════════════════════════════════════

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Sink error: {0}")]
    Sink(String),

    // ═══════════════════════════════════════════════════════════════════
    // Fatal — backend or infrastructure failure
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the generative backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend returned no usable content")]
    EmptyReply,

    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl IdeaforgeError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a parse error from anything displayable.
    pub fn parse(message: impl std::fmt::Display) -> Self {
        Self::Parse(message.to_string())
    }

    /// True for failures of a model reply's structure, which stages recover from.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }

    /// Check if this error is worth retrying at the transport level.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::Network(_)
                | Self::Backend(BackendError::RateLimited { .. })
                | Self::Backend(BackendError::Api { status: 500..=599, .. })
        )
    }

    /// Get retry delay hint in seconds, if applicable.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::Backend(BackendError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }
}

/// Result type alias for ideaforge.
pub type Result<T> = std::result::Result<T, IdeaforgeError>;
