//! Unified error type for the gatesync workspace.

use thiserror::Error;

/// Enumerates all error kinds that can occur across gatesync crates.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed rule string or source configuration entry.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required field was missing or empty at construction time.
    #[error("validation error: {0}")]
    Validation(String),

    /// Registry or key-source fetch failure (transport level).
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The registry or a key source returned a non-success status.
    #[error("upstream error: status={status}, body={body}")]
    Upstream { status: u16, body: String },

    /// Message-bus subscribe or receive failure.
    #[error("message bus error: {0}")]
    Bus(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        Self::Fetch(e.to_string())
    }
}

impl SyncError {
    /// Returns `true` if the error is likely transient and worth retrying.
    ///
    /// Validation and configuration errors are definitive: retrying them
    /// reproduces the same failure, so the retry policy treats them as fatal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
            Self::Fetch(_) | Self::Bus(_) => true,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SyncError>;
