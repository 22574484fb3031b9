use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::TrackId;
use crate::rect::NormalizedRect;

/// Track lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackStatus {
    Pending,
    Active,
    Inactive,
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Pending => "PENDING",
            TrackStatus::Active => "ACTIVE",
            TrackStatus::Inactive => "INACTIVE",
        }
    }
}

/// Fused per-identity record emitted by the video processor / orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpeakerData {
    pub id: TrackId,
    pub rect: NormalizedRect,
    pub status: TrackStatus,
    /// Consecutive misses (negative `hits`) since the last hit, 0 if none.
    pub misses: i32,
    /// Most recent speaker-classifier score for this identity, if any.
    pub score: Option<f32>,
    /// Human-readable summary of the last association costs, for diagnostics.
    pub cost_summary: String,
}

/// Emitted when an INACTIVE track is deleted and merged into a surviving
/// one. Downstream code may remap ids for persisted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MergeRequest {
    pub source_id: TrackId,
    pub target_id: TrackId,
}
