//! Error types shared across Reelsmith crates.
//!
//! Each pipeline stage has its own error enum so the orchestrator can record
//! which stage failed and whether the failure is worth retrying. `ReelError`
//! wraps them for run-level plumbing.

use std::path::PathBuf;

/// Classification used by the retry wrapper.
pub trait Retryable {
    /// Whether the operation may succeed if attempted again.
    fn is_transient(&self) -> bool;
}

/// HTTP statuses that indicate a temporary provider condition.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429) || (500..=599).contains(&status)
}

/// Errors raised while pulling candidate items from a content source.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Credentials were rejected. Fatal for the whole run.
    #[error("Authentication rejected by {provider}: {message}")]
    Auth { provider: String, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("Item not found: {id}")]
    NotFound { id: String },

    #[error("Failed to decode source response: {message}")]
    Decode { message: String },
}

impl FetchError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    /// Whether this error must abort the run instead of just the item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

impl Retryable for FetchError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::RateLimited { .. })
    }
}

/// Errors raised by the rewriter adapter.
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    /// Output was identical or near-identical to the source.
    #[error("Rewrite rejected as passthrough (n-gram overlap {overlap:.3})")]
    Passthrough { overlap: f64 },

    /// Output word count stayed outside the accepted band after the length retry.
    #[error("Rewrite length {actual} words outside [{min}, {max}]")]
    Length {
        actual: usize,
        min: usize,
        max: usize,
    },

    #[error("Transient rewrite failure: {message}")]
    Transient { message: String },

    #[error("Rewrite failed: {message}")]
    Permanent { message: String },
}

impl RewriteError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient {
            message: msg.into(),
        }
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent {
            message: msg.into(),
        }
    }
}

impl Retryable for RewriteError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Errors raised by the synthesizer adapter.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("Transient synthesis failure: {message}")]
    Transient { message: String },

    #[error("Synthesis failed: {message}")]
    Permanent { message: String },
}

impl SynthesisError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient {
            message: msg.into(),
        }
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent {
            message: msg.into(),
        }
    }
}

impl Retryable for SynthesisError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Errors raised by the subtitle builder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubtitleError {
    #[error("Script is empty after normalization")]
    EmptyScript,
}

/// Errors raised by the video composer.
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("Missing source media: {path}")]
    MissingSource { path: PathBuf },

    #[error("Encoder failure: {message}")]
    EncoderFailure { message: String },

    #[error(
        "Output duration {actual:.3}s differs from audio duration {expected:.3}s by more than {tolerance:.3}s"
    )]
    DurationMismatch {
        expected: f64,
        actual: f64,
        tolerance: f64,
    },
}

impl CompositionError {
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::EncoderFailure {
            message: msg.into(),
        }
    }
}

/// Top-level error type for Reelsmith operations.
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Subtitle(#[from] SubtitleError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Artifact store error: {message}")]
    Store { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Run cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelError.
pub type ReelResult<T> = Result<T, ReelError>;

impl ReelError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store {
            message: msg.into(),
        }
    }

    /// Errors that stop the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Fetch(err) => err.is_fatal(),
            Self::Config { .. } | Self::Cancelled => true,
            _ => false,
        }
    }
}
