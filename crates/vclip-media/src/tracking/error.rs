//! Error types for the tracking-and-temporal-fusion engine.

use thiserror::Error;

use vclip_models::TrackId;

/// Result type for tracking engine operations.
pub type TrackingResult<T> = Result<T, TrackingError>;

/// Errors surfaced by the tracking engine. Most are logged and absorbed
/// locally by the phase that hit them; only `EmbeddingShapeMismatch` is
/// surfaced synchronously to callers of the permanent-track API.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("RLAP cost matrix contains NaN or -infinity")]
    RlapInvalid,

    #[error("RLAP has no complete matching for the given cost matrix")]
    RlapInfeasible,

    #[error("detection has no embedding, dropped at track creation")]
    DetectionWithoutEmbedding,

    #[error("embedding has {found} dimensions, expected {expected}")]
    EmbeddingShapeMismatch { expected: usize, found: usize },

    #[error("Kalman innovation covariance is singular, update skipped")]
    FilterSingularInnovation,

    #[error("inference failed for track {track_id}: {message}")]
    InferenceFailure { track_id: TrackId, message: String },

    #[error("model pool exhausted")]
    ModelPoolExhausted,

    #[error("internal tracking error: {0}")]
    Internal(String),
}

impl TrackingError {
    pub fn embedding_shape_mismatch(expected: usize, found: usize) -> Self {
        Self::EmbeddingShapeMismatch { expected, found }
    }

    pub fn inference_failure(track_id: TrackId, message: impl Into<String>) -> Self {
        Self::InferenceFailure {
            track_id,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
