//! Video processor: couples the tracker's per-frame output with
//! per-track crop preprocessing and the temporal ring buffers that feed the
//! speaker classifier.

use std::collections::HashMap;

use vclip_models::{MergeRequest, TrackId, TrackStatus};

use super::config::{RingBufferConfig, TrackerConfig};
use super::face_processor::{FaceDetector, FaceEmbedder, Frame, Orientation};
use super::ring_buffer::{CropBuffer, ScoreBuffer, TimestampBuffer};
use super::tracker::{Tracker, TrackSnapshot};
use super::OrchestratorConfig;

/// A fused per-identity record: current track state paired with its most
/// recent classifier score, if any.
#[derive(Debug, Clone)]
pub struct SpeakerUpdate {
    pub track: TrackSnapshot,
    pub last_score: Option<f32>,
}

/// Per-track video record: crop window, score window, and the
/// bookkeeping needed to prune stale entries.
struct VideoRecord {
    crop_buffer: CropBuffer,
    score_buffer: ScoreBuffer,
    last_snapshot: TrackSnapshot,
    last_update_time: f64,
}

/// Owns the tracker and, per track id, a crop/score ring buffer pair. Three
/// entry points mirror the orchestrator's two frame classes plus the
/// score-application step that follows an inference frame.
pub struct VideoProcessor {
    tracker: Tracker,
    ring_config: RingBufferConfig,
    records: HashMap<TrackId, VideoRecord>,
    score_timestamps: TimestampBuffer,
}

impl VideoProcessor {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        embedder: Box<dyn FaceEmbedder>,
        tracker_config: TrackerConfig,
        orchestrator_config: OrchestratorConfig,
        ring_config: RingBufferConfig,
    ) -> Self {
        let face_processor = super::face_processor::FaceProcessor::new(
            detector,
            embedder,
            tracker_config.clone(),
            orchestrator_config,
        );
        let score_timestamps = TimestampBuffer::new(
            ring_config.asd_video_length + ring_config.score_buffer_padding,
            ring_config.front_padding,
            ring_config.back_padding,
        );
        Self {
            tracker: Tracker::new(face_processor, tracker_config),
            ring_config,
            records: HashMap::new(),
            score_timestamps,
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut Tracker {
        &mut self.tracker
    }

    /// Scoring-frame entry point: run the tracker, preprocess a fresh crop
    /// for every live track, and return each track paired with its latest
    /// classifier score.
    pub async fn update_videos_and_get_speakers(
        &mut self,
        t: f64,
        frame: &Frame,
        orientation: Orientation,
    ) -> (Vec<SpeakerUpdate>, Vec<MergeRequest>) {
        let (snapshot, merges) = self.tracker.update(frame, orientation).await;

        for track in &snapshot.tracks {
            if !track.rect.is_finite_and_positive() {
                continue;
            }
            let record = self.record_for(track.id);
            record.crop_buffer.write(frame, &track.rect);
            record.last_snapshot = track.clone();
            record.last_update_time = t;
        }
        self.prune_stale(t);

        let speakers = snapshot
            .tracks
            .iter()
            .filter(|track| track.rect.is_finite_and_positive())
            .map(|track| SpeakerUpdate {
                track: track.clone(),
                last_score: self.records.get(&track.id).and_then(|r| r.score_buffer.last_score()),
            })
            .collect();
        (speakers, merges)
    }

    /// Inference-frame entry point: run the tracker, update crop-rect
    /// metadata only (no preprocessing), and return the current crop window
    /// per track for the orchestrator to dispatch to the classifier.
    pub async fn update_tracks_and_get_frames(
        &mut self,
        t: f64,
        frame: &Frame,
        orientation: Orientation,
    ) -> (HashMap<TrackId, Vec<Vec<f32>>>, Vec<MergeRequest>) {
        let (snapshot, merges) = self.tracker.update(frame, orientation).await;

        for track in &snapshot.tracks {
            if !track.rect.is_finite_and_positive() {
                continue;
            }
            let record = self.record_for(track.id);
            record
                .crop_buffer
                .mark_crop_rect_only(frame.width as f64, frame.height as f64, &track.rect);
            record.last_snapshot = track.clone();
            record.last_update_time = t;
        }
        self.prune_stale(t);

        let mut windows = HashMap::new();
        for track in &snapshot.tracks {
            if !track.rect.is_finite_and_positive() {
                continue;
            }
            if let Some(record) = self.records.get(&track.id) {
                windows.insert(track.id, record.crop_buffer.window());
            }
        }
        (windows, merges)
    }

    /// Applies classifier score vectors produced from a prior
    /// `update_tracks_and_get_frames` call, advances the shared score
    /// timestamp buffer, and returns the tracks whose score changed.
    pub fn update_scores_and_get_speakers(
        &mut self,
        t: f64,
        scores_by_id: &HashMap<TrackId, Vec<f32>>,
    ) -> Vec<SpeakerUpdate> {
        const SCORE_WRITE_COUNT: usize = 5;
        let mut updates = Vec::new();
        for (id, scores) in scores_by_id {
            let Some(record) = self.records.get_mut(id) else {
                continue;
            };
            let count = SCORE_WRITE_COUNT.min(scores.len());
            record.score_buffer.write(scores, count);
            updates.push(SpeakerUpdate {
                track: record.last_snapshot.clone(),
                last_score: record.score_buffer.last_score(),
            });
        }
        if !scores_by_id.is_empty() {
            self.score_timestamps.write(t, SCORE_WRITE_COUNT);
        }
        updates
    }

    fn record_for(&mut self, id: TrackId) -> &mut VideoRecord {
        self.records.entry(id).or_insert_with(|| VideoRecord {
            crop_buffer: CropBuffer::new(self.ring_config),
            score_buffer: ScoreBuffer::new(self.ring_config),
            last_snapshot: TrackSnapshot {
                id,
                rect: vclip_models::NormalizedRect::new(0.0, 0.0, 0.0, 0.0),
                status: TrackStatus::Pending,
                hits: 0,
                cost_summary: String::new(),
            },
            last_update_time: f64::NEG_INFINITY,
        })
    }

    /// Remove any record whose last write predates the current frame: its
    /// track is no longer present in the tracker's live population.
    fn prune_stale(&mut self, t: f64) {
        self.records.retain(|_, record| record.last_update_time >= t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::face_processor::Observation;
    use async_trait::async_trait;
    use vclip_models::{NormalizedRect, EMBEDDING_DIM};

    struct FixedDetector(Vec<Observation>);

    #[async_trait]
    impl FaceDetector for FixedDetector {
        async fn detect(&self, _frame: &Frame, _orientation: Orientation) -> Vec<Observation> {
            self.0.clone()
        }
    }

    struct FixedEmbedder;

    #[async_trait]
    impl FaceEmbedder for FixedEmbedder {
        async fn embed_batch(
            &self,
            _frame: &Frame,
            rects: &[NormalizedRect],
            _orientation: Orientation,
        ) -> Vec<[f32; EMBEDDING_DIM]> {
            rects.iter().map(|_| [1.0f32; EMBEDDING_DIM]).collect()
        }
    }

    fn frame() -> Frame {
        Frame {
            width: 112,
            height: 112,
            pixels: vec![128u8; 112 * 112 * 4],
        }
    }

    fn processor(observations: Vec<Observation>) -> VideoProcessor {
        VideoProcessor::new(
            Box::new(FixedDetector(observations)),
            Box::new(FixedEmbedder),
            TrackerConfig::default(),
            OrchestratorConfig::default(),
            RingBufferConfig::default(),
        )
    }

    #[tokio::test]
    async fn scoring_frame_returns_one_speaker_per_live_track() {
        let mut vp = processor(vec![Observation {
            rect_normalized: NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
            confidence: 0.9,
        }]);
        let (speakers, merges) = vp.update_videos_and_get_speakers(0.0, &frame(), Orientation::default()).await;
        assert_eq!(speakers.len(), 1);
        assert_eq!(speakers[0].last_score, None);
        assert!(merges.is_empty());
    }

    #[tokio::test]
    async fn inference_frame_returns_crop_window_of_configured_length() {
        let mut vp = processor(vec![Observation {
            rect_normalized: NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
            confidence: 0.9,
        }]);
        let (windows, _) = vp.update_tracks_and_get_frames(0.0, &frame(), Orientation::default()).await;
        assert_eq!(windows.len(), 1);
        let window = windows.values().next().unwrap();
        assert_eq!(window.len(), RingBufferConfig::default().asd_video_length);
    }

    #[tokio::test]
    async fn scores_round_trip_into_last_score() {
        let mut vp = processor(vec![Observation {
            rect_normalized: NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
            confidence: 0.9,
        }]);
        let (windows, _) = vp.update_tracks_and_get_frames(0.0, &frame(), Orientation::default()).await;
        let id = *windows.keys().next().unwrap();

        let mut scores = HashMap::new();
        scores.insert(id, vec![0.1, 0.2, 0.3, 0.4, 0.9]);
        let updates = vp.update_scores_and_get_speakers(1.0, &scores);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].last_score, Some(0.9));
    }

    #[tokio::test]
    async fn records_are_pruned_once_their_track_disappears() {
        let mut vp = processor(vec![Observation {
            rect_normalized: NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
            confidence: 0.9,
        }]);
        let _ = vp.update_videos_and_get_speakers(0.0, &frame(), Orientation::default()).await;
        assert_eq!(vp.records.len(), 1);

        // Replace the detector with one producing nothing; the pending track
        // will take many frames to actually delete via the state machine, but
        // a record for a track id not present this frame is pruned
        // immediately once its last_update_time falls behind `t`.
        let mut vp = processor(vec![]);
        vp.records.insert(
            TrackId::new(),
            VideoRecord {
                crop_buffer: CropBuffer::new(RingBufferConfig::default()),
                score_buffer: ScoreBuffer::new(RingBufferConfig::default()),
                last_snapshot: TrackSnapshot {
                    id: TrackId::new(),
                    rect: NormalizedRect::new(0.0, 0.0, 0.1, 0.1),
                    status: TrackStatus::Pending,
                    hits: 0,
                    cost_summary: String::new(),
                },
                last_update_time: -1.0,
            },
        );
        let _ = vp.update_videos_and_get_speakers(0.0, &frame(), Orientation::default()).await;
        assert!(vp.records.is_empty());
    }
}
