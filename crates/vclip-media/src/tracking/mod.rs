//! Real-time active speaker detection: the tracking-and-temporal-fusion
//! engine. Four tightly-coupled subsystems live here:
//!
//! - a visual Kalman filter per track ([`kalman`])
//! - a multi-stage data-association pipeline with an RLAP solver
//!   ([`tracker`], [`rlap`])
//! - a track lifecycle state machine ([`track`])
//! - a per-track ring-buffered temporal store ([`ring_buffer`],
//!   [`video_processor`])
//!
//! The face detector/embedder and the speaker classifier are black boxes to
//! this module: [`face_processor`] wraps the former pair behind the
//! [`face_processor::FaceDetector`]/[`face_processor::FaceEmbedder`] traits,
//! and the classifier is represented by whatever `Classifier`-shaped trait
//! the orchestrator crate supplies around a borrowed model-pool handle.

pub mod config;
pub mod error;
pub mod face_processor;
pub mod kalman;
pub mod ring_buffer;
pub mod rlap;
pub mod track;
pub mod tracker;
pub mod video_processor;

pub use config::{OrchestratorConfig, RingBufferConfig, TrackerConfig};
pub use error::{TrackingError, TrackingResult};
pub use face_processor::{FaceDetector, FaceEmbedder, FaceProcessor, Frame, Observation, Orientation};
pub use kalman::VisualKalmanFilter;
pub use ring_buffer::{derive_crop_rect, preprocess_face, ChunkedRingBuffer, CropBuffer, PixelRect, ScoreBuffer, TimestampBuffer};
pub use rlap::{Assignment, RlapStatus};
pub use track::{AssociationCosts, Track};
pub use tracker::{SendableTracks, Tracker, TrackerStats, TrackSnapshot};
pub use video_processor::{SpeakerUpdate, VideoProcessor};
