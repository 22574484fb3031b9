//! Real-time active speaker detection: the tracking-and-temporal-fusion
//! engine.
//!
//! This crate provides:
//! - a 7-state visual Kalman filter per track (`tracking::kalman`)
//! - a multi-stage detection-to-track data-association pipeline with an
//!   RLAP solver (`tracking::tracker`, `tracking::rlap`)
//! - a PENDING/ACTIVE/INACTIVE track lifecycle state machine
//!   (`tracking::track`)
//! - per-track ring-buffered crop/score/timestamp stores
//!   (`tracking::ring_buffer`) coupled to tracker output
//!   (`tracking::video_processor`)
//!
//! Camera capture, the detector/embedder/classifier ML models themselves,
//! and the UI/rendering layer are out of scope; the detector and
//! embedder are represented here as the black-box
//! `tracking::face_processor::FaceDetector` / `FaceEmbedder` traits.

#![deny(unreachable_patterns)]

pub mod error;
pub mod tracking;

pub use error::{MediaError, MediaResult};
pub use tracking::{
    AssociationCosts, ChunkedRingBuffer, CropBuffer, FaceDetector, FaceEmbedder, FaceProcessor, Frame,
    Observation, Orientation, OrchestratorConfig, PixelRect, RingBufferConfig, ScoreBuffer, SendableTracks,
    SpeakerUpdate, Track, TrackSnapshot, Tracker, TrackerConfig, TrackerStats, TrackingError, TrackingResult,
    VideoProcessor, VisualKalmanFilter,
};
