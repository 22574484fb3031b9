//! Face processor facade: thin wrapper over the detector and
//! embedder black-box models, returning detections with appearance vectors
//! filled in on demand.

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::warn;
use vclip_models::{Detection, DetectionId, NormalizedRect, EMBEDDING_DIM};

use super::config::{OrchestratorConfig, TrackerConfig};

/// One raw detector observation before confidence filtering or widening.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub rect_normalized: NormalizedRect,
    pub confidence: f32,
}

/// Orientation hint passed through to the detector/embedder, e.g. a
/// rotation applied by upstream capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Orientation(pub i32);

/// A raw video frame handed to the detector/embedder. Opaque to the tracking
/// engine beyond its dimensions.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Black-box face detector: `detect(frame, orientation) -> [Observation]`.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, frame: &Frame, orientation: Orientation) -> Vec<Observation>;
}

/// Black-box face embedder: `embed_batch(frame, rects, orientation) -> [f32; 128][]`.
#[async_trait]
pub trait FaceEmbedder: Send + Sync {
    async fn embed_batch(
        &self,
        frame: &Frame,
        rects: &[NormalizedRect],
        orientation: Orientation,
    ) -> Vec<[f32; EMBEDDING_DIM]>;
}

/// Tracks a single in-flight (or idle, pre-warmed) embedder request slot.
struct EmbedderRequest {
    idle_frames: u32,
}

/// Facade coordinating the detector and embedder, applying the confidence
/// floor and detector-bias widening, and keeping a floor of
/// pre-warmed embedder request slots alive.
pub struct FaceProcessor {
    detector: Box<dyn FaceDetector>,
    embedder: Box<dyn FaceEmbedder>,
    tracker_config: TrackerConfig,
    min_ready_embedder_requests: usize,
    embedder_request_lifespan: u32,
    requests: VecDeque<EmbedderRequest>,
    next_detection_id: u64,
}

impl FaceProcessor {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        embedder: Box<dyn FaceEmbedder>,
        tracker_config: TrackerConfig,
        orchestrator_config: OrchestratorConfig,
    ) -> Self {
        let mut requests = VecDeque::new();
        for _ in 0..orchestrator_config.min_ready_embedder_requests {
            requests.push_back(EmbedderRequest { idle_frames: 0 });
        }
        Self {
            detector,
            embedder,
            tracker_config,
            min_ready_embedder_requests: orchestrator_config.min_ready_embedder_requests,
            embedder_request_lifespan: orchestrator_config.embedder_request_lifespan,
            requests,
            next_detection_id: 0,
        }
    }

    /// Run the detector, filter by confidence, and widen each surviving rect
    /// by the configured x factor.
    pub async fn detect(&mut self, frame: &Frame, orientation: Orientation) -> Vec<Detection> {
        let observations = self.detector.detect(frame, orientation).await;
        let mut detections = Vec::with_capacity(observations.len());
        for obs in observations {
            if obs.confidence < self.tracker_config.confidence_threshold {
                continue;
            }
            let id = DetectionId(self.next_detection_id);
            self.next_detection_id += 1;
            let mut detection = Detection::new(id, obs.rect_normalized, obs.confidence);
            detection.widen_x(self.tracker_config.detector_x_widen);
            detections.push(detection);
        }
        detections
    }

    /// Fill `embedding` in place for each supplied detection, clipping rects
    /// to `[0,1]^2` before invoking the embedder. Ensures the pre-warmed
    /// request floor is maintained and expires idle requests past their
    /// configured lifespan.
    pub async fn embed(
        &mut self,
        frame: &Frame,
        detections: &mut [Detection],
        orientation: Orientation,
    ) {
        if detections.is_empty() {
            self.age_requests();
            return;
        }
        self.ensure_ready_requests();

        let rects: Vec<NormalizedRect> = detections.iter().map(|d| clip_unit_square(&d.rect)).collect();
        let embeddings = self.embedder.embed_batch(frame, &rects, orientation).await;

        if embeddings.len() != detections.len() {
            warn!(
                expected = detections.len(),
                found = embeddings.len(),
                "embedder returned a mismatched batch size, dropping embeddings for this frame"
            );
            return;
        }

        for (detection, embedding) in detections.iter_mut().zip(embeddings.into_iter()) {
            detection.embedding = Some(embedding.to_vec());
        }
        self.age_requests();
    }

    fn ensure_ready_requests(&mut self) {
        while self.requests.len() < self.min_ready_embedder_requests {
            self.requests.push_back(EmbedderRequest { idle_frames: 0 });
        }
        for req in self.requests.iter_mut() {
            req.idle_frames = 0;
        }
    }

    fn age_requests(&mut self) {
        for req in self.requests.iter_mut() {
            req.idle_frames += 1;
        }
        while self.requests.len() > self.min_ready_embedder_requests
            && self
                .requests
                .front()
                .map(|r| r.idle_frames >= self.embedder_request_lifespan)
                .unwrap_or(false)
        {
            self.requests.pop_front();
        }
    }
}

fn clip_unit_square(rect: &NormalizedRect) -> NormalizedRect {
    let x = rect.x.clamp(0.0, 1.0);
    let y = rect.y.clamp(0.0, 1.0);
    let x2 = (rect.x + rect.width).clamp(0.0, 1.0);
    let y2 = (rect.y + rect.height).clamp(0.0, 1.0);
    NormalizedRect::new(x, y, (x2 - x).max(0.0), (y2 - y).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

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
            width: 640,
            height: 480,
            pixels: vec![],
        }
    }

    #[tokio::test]
    async fn detect_filters_low_confidence_and_widens_x() {
        let detector = FixedDetector(vec![
            Observation {
                rect_normalized: NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
                confidence: 0.9,
            },
            Observation {
                rect_normalized: NormalizedRect::new(0.1, 0.1, 0.1, 0.1),
                confidence: 0.1,
            },
        ]);
        let mut processor = FaceProcessor::new(
            Box::new(detector),
            Box::new(FixedEmbedder),
            TrackerConfig::default(),
            OrchestratorConfig::default(),
        );
        let detections = processor.detect(&frame(), Orientation::default()).await;
        assert_eq!(detections.len(), 1);
        assert!((detections[0].rect.width - 0.28).abs() < 1e-9);
    }

    #[tokio::test]
    async fn embed_fills_embeddings_in_place() {
        let detector = FixedDetector(vec![]);
        let mut processor = FaceProcessor::new(
            Box::new(detector),
            Box::new(FixedEmbedder),
            TrackerConfig::default(),
            OrchestratorConfig::default(),
        );
        let mut detections = vec![Detection::new(
            DetectionId(0),
            NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
            0.9,
        )];
        processor
            .embed(&frame(), &mut detections, Orientation::default())
            .await;
        assert!(detections[0].embedding.is_some());
    }
}
