#![deny(unreachable_patterns)]
//! ASD orchestrator binary driving the tracking and temporal fusion engine.
//!
//! This crate provides:
//! - worker-level configuration layered over the tracking engine's own
//!   (`config`)
//! - a fixed-capacity classifier model pool (`model_pool`)
//! - the per-sample orchestration loop tying the tracker, model pool, and a
//!   caller's speaker/merge callbacks together (`orchestrator`)
//! - tracing setup (`logging`)

pub mod config;
pub mod error;
pub mod logging;
pub mod model_pool;
pub mod orchestrator;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use model_pool::{ModelPool, PoolGuard};
pub use orchestrator::{
    BoxFuture, Classifier, EngineStats, MergeSink, Orchestrator, Sample, SpeakerSink,
};
