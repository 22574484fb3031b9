//! Shared data models for the active speaker detection pipeline.
//!
//! This crate provides the Serde-serializable wire types exchanged between
//! the tracking engine (`vclip-media`) and its callers:
//! - normalized rectangles and IoU geometry (`rect`)
//! - track and detection identities (`ids`)
//! - per-frame detections, including lazily-populated appearance embeddings
//!   (`detection`)
//! - fused per-identity output records and merge notifications (`speaker`)

pub mod detection;
pub mod ids;
pub mod rect;
pub mod speaker;

pub use detection::{Detection, DEFAULT_CONFIDENCE_THRESHOLD, EMBEDDING_DIM};
pub use ids::{DetectionId, TrackId};
pub use rect::NormalizedRect;
pub use speaker::{MergeRequest, SpeakerData, TrackStatus};
