//! Numeric constants and tunables for the tracking-and-temporal-fusion engine.

/// Configuration for the tracker's data-association pipeline and the track
/// lifecycle state machine it drives.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// IoU weight in the fused RLAP cost: `total = motion_weight * iou + (1 - motion_weight) * appearance`.
    pub motion_weight: f64,
    /// Motion gate: minimum IoU for a (track, detection) pair to survive the initial cost filter.
    pub min_iou: f64,
    /// Appearance gate: maximum cosine distance for a pair to survive the cost filter.
    pub max_appearance_cost: f64,
    /// Consecutive accumulated hits required for PENDING -> ACTIVE.
    pub confirmation_threshold: i32,
    /// Consecutive hits required for INACTIVE -> ACTIVE.
    pub activation_threshold: i32,
    /// Consecutive misses required for ACTIVE -> INACTIVE.
    pub deactivation_threshold: i32,
    /// Misses (beyond deactivation) required before a non-permanent track is deletable.
    pub deletion_threshold: i32,
    /// Frames between embedding refreshes for an ACTIVE track.
    pub iterations_per_embedding_update: i32,
    /// Base rate for the embedding EMA update.
    pub embedding_alpha: f32,
    /// Per-second multiplicative velocity decay applied on deactivation; raised to `dt`.
    pub velocity_damping: f32,
    /// Per-second multiplicative growth decay applied on deactivation; raised to `dt`.
    pub growth_damping: f32,
    /// Kalman filter time step, in seconds.
    pub dt: f32,
    /// Detector confidence floor applied by the face processor.
    pub confidence_threshold: f32,
    /// Fraction by which detected rects are widened on x to compensate for detector bias.
    pub detector_x_widen: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            motion_weight: 0.10,
            min_iou: 0.30,
            max_appearance_cost: 0.30,
            confirmation_threshold: 15,
            activation_threshold: 2,
            deactivation_threshold: 8,
            deletion_threshold: 300,
            iterations_per_embedding_update: 5,
            embedding_alpha: 0.20,
            velocity_damping: 0.5,
            growth_damping: 0.1,
            dt: 1.0 / 30.0,
            confidence_threshold: 0.5,
            detector_x_widen: 0.20,
        }
    }
}

/// Per-track ring buffer and crop preprocessing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingBufferConfig {
    /// Logical temporal window length, `T` in the classifier's input shape.
    pub asd_video_length: usize,
    /// Crop height/width fed to the classifier.
    pub asd_frame_size: usize,
    /// `cs` in the crop-rect derivation: fraction of box size added as padding.
    pub asd_crop_padding: f64,
    /// Extra chunks addressable below the logical window via negative indices.
    pub front_padding: usize,
    /// Extra chunks reserved past the write cursor before a wrap is forced.
    pub back_padding: usize,
    /// Neutral fill value for out-of-frame crop regions (matches `(110,110,110,255)` luma 110).
    pub fill_value: f32,
    /// Extra chunks beyond `asd_video_length` in the video processor's shared
    /// score-timestamp buffer, absorbing the gap between a crop write and the
    /// later score write for the same sample.
    pub score_buffer_padding: usize,
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self {
            asd_video_length: 25,
            asd_frame_size: 112,
            asd_crop_padding: 0.40,
            front_padding: 3,
            back_padding: 25,
            fill_value: 110.0,
            score_buffer_padding: 5,
        }
    }
}

/// Orchestrator-level configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    /// Number of classifier replicas in the model pool.
    pub model_pool_size: usize,
    /// Scoring-frame cadence: sample `i` is a scoring frame iff `i < frame_skip_cycle`
    /// modulo the cycle reset boundary.
    pub frame_skip_cycle: u32,
    /// Floor of pre-warmed embedder requests the face processor keeps ready.
    pub min_ready_embedder_requests: usize,
    /// Number of idle frames after which an embedder request above the floor expires.
    pub embedder_request_lifespan: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model_pool_size: 6,
            frame_skip_cycle: 6,
            min_ready_embedder_requests: 1,
            embedder_request_lifespan: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let t = TrackerConfig::default();
        assert_eq!(t.confirmation_threshold, 15);
        assert_eq!(t.deactivation_threshold, 8);
        assert_eq!(t.deletion_threshold, 300);

        let r = RingBufferConfig::default();
        assert_eq!(r.asd_video_length, 25);
        assert_eq!(r.asd_frame_size, 112);

        let o = OrchestratorConfig::default();
        assert_eq!(o.model_pool_size, 6);
        assert_eq!(o.frame_skip_cycle, 6);
    }
}
