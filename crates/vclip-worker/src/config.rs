//! Worker configuration: bundles the tracking engine's tunables with the
//! binary-level knobs that only matter once it's wired into a process
//! (metrics exposure, the classifier pool size).

use vclip_media::{OrchestratorConfig, RingBufferConfig, TrackerConfig};

/// Top-level configuration for the `vclip-worker` binary.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub tracker: TrackerConfig,
    pub orchestrator: OrchestratorConfig,
    pub ring_buffer: RingBufferConfig,
    /// Address the Prometheus metrics exporter binds to.
    pub metrics_addr: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            ring_buffer: RingBufferConfig::default(),
            metrics_addr: "0.0.0.0:9100".to_string(),
        }
    }
}

impl WorkerConfig {
    /// A preset favoring lower latency over tracking accuracy: a smaller
    /// model pool and a shorter crop window, at the cost of fewer scoring
    /// frames informing each classifier call.
    pub fn fast() -> Self {
        Self {
            orchestrator: OrchestratorConfig {
                model_pool_size: 2,
                ..OrchestratorConfig::default()
            },
            ring_buffer: RingBufferConfig {
                asd_video_length: 13,
                ..RingBufferConfig::default()
            },
            ..Self::default()
        }
    }

    /// A preset favoring tracking accuracy: more classifier replicas and a
    /// longer temporal window.
    pub fn quality() -> Self {
        Self {
            orchestrator: OrchestratorConfig {
                model_pool_size: 10,
                ..OrchestratorConfig::default()
            },
            ring_buffer: RingBufferConfig {
                asd_video_length: 37,
                ..RingBufferConfig::default()
            },
            ..Self::default()
        }
    }

    /// Load configuration from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_f64("TRACKER_MOTION_WEIGHT") {
            config.tracker.motion_weight = v;
        }
        if let Some(v) = env_f64("TRACKER_MIN_IOU") {
            config.tracker.min_iou = v;
        }
        if let Some(v) = env_f64("TRACKER_MAX_APPEARANCE_COST") {
            config.tracker.max_appearance_cost = v;
        }
        if let Some(v) = env_parse::<i32>("TRACKER_CONFIRMATION_THRESHOLD") {
            config.tracker.confirmation_threshold = v;
        }
        if let Some(v) = env_parse::<i32>("TRACKER_DEACTIVATION_THRESHOLD") {
            config.tracker.deactivation_threshold = v;
        }
        if let Some(v) = env_parse::<i32>("TRACKER_DELETION_THRESHOLD") {
            config.tracker.deletion_threshold = v;
        }

        if let Some(v) = env_parse::<usize>("ASD_MODEL_POOL_SIZE") {
            config.orchestrator.model_pool_size = v;
        }
        if let Some(v) = env_parse::<u32>("ASD_FRAME_SKIP_CYCLE") {
            config.orchestrator.frame_skip_cycle = v;
        }

        if let Some(v) = env_parse::<usize>("ASD_VIDEO_LENGTH") {
            config.ring_buffer.asd_video_length = v;
        }
        if let Some(v) = env_parse::<usize>("ASD_FRAME_SIZE") {
            config.ring_buffer.asd_frame_size = v;
        }

        if let Ok(v) = std::env::var("METRICS_ADDR") {
            config.metrics_addr = v;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env_parse::<f64>(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_tracking_engine_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.tracker, TrackerConfig::default());
        assert_eq!(config.orchestrator, OrchestratorConfig::default());
        assert_eq!(config.ring_buffer, RingBufferConfig::default());
    }

    #[test]
    fn fast_trades_pool_size_and_window_length_for_latency() {
        let fast = WorkerConfig::fast();
        let quality = WorkerConfig::quality();
        assert!(fast.orchestrator.model_pool_size < quality.orchestrator.model_pool_size);
        assert!(fast.ring_buffer.asd_video_length < quality.ring_buffer.asd_video_length);
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        std::env::remove_var("TRACKER_MIN_IOU");
        let config = WorkerConfig::from_env();
        assert_eq!(config.tracker.min_iou, TrackerConfig::default().min_iou);
    }
}
