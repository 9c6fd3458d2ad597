//! Error types for the PitchView environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The frame source failed to produce a frame (decoder fault, bad device, etc.)
    #[error("Frame source error: {0}")]
    SourceError(String),

    /// The producer side of a frame feed went away
    #[error("Frame feed closed for view {0}")]
    FeedClosed(String),

    /// A frame did not match the geometry the view was configured for
    #[error("Frame geometry mismatch: expected {expected:?}, got {actual:?}")]
    GeometryMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a frame source error.
    pub fn source(msg: impl Into<String>) -> Self {
        Self::SourceError(msg.into())
    }

    /// Creates a closed-feed error.
    pub fn closed(view: impl std::fmt::Display) -> Self {
        Self::FeedClosed(view.to_string())
    }
}
