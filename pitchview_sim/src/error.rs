//! Error types for the PitchView simulator.

use pitchview_core::{ConfigError, RuntimeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// A synthetic camera could not be built
    #[error("Invalid camera geometry: {0}")]
    Geometry(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SimError {
    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::Geometry(msg.into())
    }
}
