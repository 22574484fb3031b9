//! Crate-level error type for `vclip-media`.

use thiserror::Error;

use crate::tracking::TrackingError;

/// Result type for top-level `vclip-media` operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors surfaced by the `vclip-media` facade. Most tracking-engine
/// failures degrade locally and never reach this type; this enum
/// covers the cases that do escape to a caller.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("tracking engine error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
