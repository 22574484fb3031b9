//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that can abort the `vclip-worker` binary outright. Per-sample
/// tracking/classifier failures degrade locally inside the orchestrator and
/// never surface here.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to start the metrics exporter: {0}")]
    MetricsInit(String),

    #[error("classifier model failed to load: {0}")]
    ModelLoad(String),

    #[error("tracking engine error: {0}")]
    Media(#[from] vclip_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }
}
