//! ASD orchestrator: drives the per-sample pipeline, alternating
//! scoring frames (tracker + crop capture) with inference frames (crop
//! dispatch to the model pool), and delivers results to the caller's sinks in
//! strict arrival order even though the underlying work completes out of
//! order.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::warn;

use vclip_media::{
    Frame, MergeRequest, Orientation, OrchestratorConfig, RingBufferConfig, SpeakerUpdate, TrackerConfig,
    VideoProcessor,
};
use vclip_models::TrackId;

use crate::model_pool::ModelPool;

/// A boxed, `Send` future, used where the orchestrator needs to hold an
/// async callback without committing to a concrete future type.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One incoming camera sample.
#[derive(Debug, Clone)]
pub struct Sample {
    pub t: f64,
    pub frame: Frame,
    pub orientation: Orientation,
}

/// The black-box speaker classifier. Given a preprocessed crop window
/// (`T` chunks of `height * width` luma floats in `[0, 1]`), returns one
/// score per chunk.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn predict(&self, window: &[Vec<f32>], height: usize, width: usize) -> Vec<f32>;
}

/// Receives ordered speaker updates as the orchestrator produces them.
pub trait SpeakerSink: Send + Sync {
    fn emit(&self, updates: Vec<SpeakerUpdate>) -> BoxFuture<'static, ()>;
}

/// Receives merge requests as the tracker's merge-on-deletion policy fires.
pub trait MergeSink: Send + Sync {
    fn emit(&self, merges: Vec<MergeRequest>) -> BoxFuture<'static, ()>;
}

/// Point-in-time orchestrator counters, useful for a `/metrics` endpoint or
/// periodic logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub frames_seen: u64,
    pub scoring_frames: u64,
    pub inference_frames: u64,
    pub inference_jobs_dispatched: u64,
    pub inference_jobs_failed: u64,
}

/// Job-level counters updated from detached inference tasks, where
/// `&mut Orchestrator` isn't available. Frame-level counters don't need
/// this: intake is single-threaded, so `Orchestrator::submit` updates them
/// directly.
#[derive(Default)]
struct JobCounters {
    dispatched: std::sync::atomic::AtomicU64,
    failed: std::sync::atomic::AtomicU64,
}

struct DeliveryPayload {
    speakers: Vec<SpeakerUpdate>,
    merges: Vec<MergeRequest>,
}

/// Drives the tracking-and-temporal-fusion engine one sample at a time.
/// Intake (this struct's methods) is meant to be called sequentially by a
/// single driver loop; each sample is then processed on a detached task so
/// intake never blocks on tracker work, model-pool availability, or a
/// caller's callback.
pub struct Orchestrator {
    config: OrchestratorConfig,
    video_processor: Arc<Mutex<VideoProcessor>>,
    model_pool: Arc<ModelPool<Box<dyn Classifier>>>,
    speaker_sink: Arc<dyn SpeakerSink>,
    merge_sink: Arc<dyn MergeSink>,
    delivery_tx: mpsc::UnboundedSender<oneshot::Receiver<DeliveryPayload>>,
    frame_counter: u32,
    frame_size: usize,
    stats: EngineStats,
    job_counters: Arc<JobCounters>,
}

impl Orchestrator {
    pub fn new(
        tracker_config: TrackerConfig,
        orchestrator_config: OrchestratorConfig,
        ring_config: RingBufferConfig,
        detector: Box<dyn vclip_media::FaceDetector>,
        embedder: Box<dyn vclip_media::FaceEmbedder>,
        classifiers: Vec<Box<dyn Classifier>>,
        speaker_sink: Arc<dyn SpeakerSink>,
        merge_sink: Arc<dyn MergeSink>,
    ) -> Self {
        let video_processor = VideoProcessor::new(
            detector,
            embedder,
            tracker_config,
            orchestrator_config,
            ring_config,
        );
        let model_pool = ModelPool::new(classifiers);
        let frame_size = ring_config.asd_frame_size;

        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        spawn_delivery_loop(delivery_rx, Arc::clone(&speaker_sink), Arc::clone(&merge_sink));

        Self {
            config: orchestrator_config,
            video_processor: Arc::new(Mutex::new(video_processor)),
            model_pool: Arc::new(model_pool),
            speaker_sink,
            merge_sink,
            delivery_tx,
            frame_counter: 0,
            frame_size,
            stats: EngineStats::default(),
            job_counters: Arc::new(JobCounters::default()),
        }
    }

    /// Current counters. Frame-level counts are exact (intake is
    /// single-threaded); job-level counts are a snapshot that may lag
    /// slightly behind jobs still in flight.
    pub fn stats(&self) -> EngineStats {
        use std::sync::atomic::Ordering;
        EngineStats {
            inference_jobs_dispatched: self.job_counters.dispatched.load(Ordering::Relaxed),
            inference_jobs_failed: self.job_counters.failed.load(Ordering::Relaxed),
            ..self.stats
        }
    }

    /// Intake a single sample: classify it as a scoring or inference frame
    /// per the frame-skip cadence, then dispatch the rest of the work to a
    /// detached task. Returns once the task is spawned; never awaits tracker
    /// work, model-pool availability, or the sink callbacks.
    pub fn submit(&mut self, sample: Sample) {
        self.stats.frames_seen += 1;
        let is_scoring = self.advance_and_classify();

        let video_processor = Arc::clone(&self.video_processor);
        let model_pool = Arc::clone(&self.model_pool);
        let frame_size = self.frame_size;
        let job_counters = Arc::clone(&self.job_counters);

        let (tx, rx) = oneshot::channel();
        // An unbounded send only fails if the delivery loop's receiver has
        // been dropped, which only happens when the orchestrator itself is
        // gone; there is then nothing left to deliver to.
        let _ = self.delivery_tx.send(rx);

        if is_scoring {
            self.stats.scoring_frames += 1;
            tokio::spawn(async move {
                let (speakers, merges) = {
                    let mut vp = video_processor.lock().await;
                    vp.update_videos_and_get_speakers(sample.t, &sample.frame, sample.orientation)
                        .await
                };
                let _ = tx.send(DeliveryPayload { speakers, merges });
            });
        } else {
            self.stats.inference_frames += 1;
            tokio::spawn(async move {
                let (windows, merges) = {
                    let mut vp = video_processor.lock().await;
                    vp.update_tracks_and_get_frames(sample.t, &sample.frame, sample.orientation)
                        .await
                };

                let scores = dispatch_inference(&model_pool, windows, frame_size, &job_counters).await;

                let speakers = {
                    let mut vp = video_processor.lock().await;
                    vp.update_scores_and_get_speakers(sample.t, &scores)
                };
                let _ = tx.send(DeliveryPayload { speakers, merges });
            });
        }
    }

    /// Frame-skip policy: within each `frame_skip_cycle`-sample window,
    /// the first sample is an inference frame and the rest are scoring
    /// frames. Returns `true` for a scoring frame.
    fn advance_and_classify(&mut self) -> bool {
        let cycle = self.config.frame_skip_cycle.max(1);
        let is_inference = self.frame_counter == 0;
        self.frame_counter = (self.frame_counter + 1) % cycle;
        !is_inference
    }
}

async fn dispatch_inference(
    model_pool: &Arc<ModelPool<Box<dyn Classifier>>>,
    windows: HashMap<TrackId, Vec<Vec<f32>>>,
    frame_size: usize,
    job_counters: &Arc<JobCounters>,
) -> HashMap<TrackId, Vec<f32>> {
    use std::sync::atomic::Ordering;

    let mut handles = Vec::with_capacity(windows.len());
    for (id, window) in windows {
        let pool = Arc::clone(model_pool);
        job_counters.dispatched.fetch_add(1, Ordering::Relaxed);
        handles.push((
            id,
            tokio::spawn(async move {
                pool.with_model(|classifier| classifier.predict(&window, frame_size, frame_size))
                    .await
            }),
        ));
    }

    let mut scores = HashMap::with_capacity(handles.len());
    for (id, handle) in handles {
        match handle.await {
            Ok(result) => {
                scores.insert(id, result);
            }
            Err(join_err) => {
                job_counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(track_id = ?id, error = %join_err, "inference task did not complete, leaving score unchanged");
            }
        }
    }
    scores
}

fn spawn_delivery_loop(
    mut rx: mpsc::UnboundedReceiver<oneshot::Receiver<DeliveryPayload>>,
    speaker_sink: Arc<dyn SpeakerSink>,
    merge_sink: Arc<dyn MergeSink>,
) {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            // Awaiting each job in submission order, rather than racing them,
            // is what gives callbacks their ordering guarantee: a later
            // sample's result simply waits here until the earlier one's
            // callback has already run.
            match job.await {
                Ok(payload) => {
                    if !payload.speakers.is_empty() {
                        speaker_sink.emit(payload.speakers).await;
                    }
                    if !payload.merges.is_empty() {
                        merge_sink.emit(payload.merges).await;
                    }
                }
                Err(_) => {
                    // The producing task was cancelled or panicked before
                    // sending; no callback fires for that sample.
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vclip_media::Observation;
    use vclip_models::{NormalizedRect, EMBEDDING_DIM};

    struct FixedDetector(Vec<Observation>);

    #[async_trait]
    impl vclip_media::FaceDetector for FixedDetector {
        async fn detect(&self, _frame: &Frame, _orientation: Orientation) -> Vec<Observation> {
            self.0.clone()
        }
    }

    struct FixedEmbedder;

    #[async_trait]
    impl vclip_media::FaceEmbedder for FixedEmbedder {
        async fn embed_batch(
            &self,
            _frame: &Frame,
            rects: &[NormalizedRect],
            _orientation: Orientation,
        ) -> Vec<[f32; EMBEDDING_DIM]> {
            rects.iter().map(|_| [1.0f32; EMBEDDING_DIM]).collect()
        }
    }

    struct FixedClassifier;

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn predict(&self, window: &[Vec<f32>], _height: usize, _width: usize) -> Vec<f32> {
            vec![0.5; window.len()]
        }
    }

    struct RecordingSpeakerSink(Arc<Mutex<Vec<usize>>>);

    impl SpeakerSink for RecordingSpeakerSink {
        fn emit(&self, updates: Vec<SpeakerUpdate>) -> BoxFuture<'static, ()> {
            let log = Arc::clone(&self.0);
            Box::pin(async move {
                log.lock().await.push(updates.len());
            })
        }
    }

    struct NoopMergeSink;

    impl MergeSink for NoopMergeSink {
        fn emit(&self, _merges: Vec<MergeRequest>) -> BoxFuture<'static, ()> {
            Box::pin(async {})
        }
    }

    fn frame() -> Frame {
        Frame {
            width: 112,
            height: 112,
            pixels: vec![128u8; 112 * 112 * 4],
        }
    }

    #[tokio::test]
    async fn first_sample_in_each_cycle_is_an_inference_frame() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut orchestrator = Orchestrator::new(
            TrackerConfig::default(),
            OrchestratorConfig { frame_skip_cycle: 3, ..OrchestratorConfig::default() },
            RingBufferConfig::default(),
            Box::new(FixedDetector(vec![Observation {
                rect_normalized: NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
                confidence: 0.9,
            }])),
            Box::new(FixedEmbedder),
            vec![Box::new(FixedClassifier)],
            Arc::new(RecordingSpeakerSink(log)),
            Arc::new(NoopMergeSink),
        );

        assert!(!orchestrator.advance_and_classify());
        assert!(orchestrator.advance_and_classify());
        assert!(orchestrator.advance_and_classify());
        assert!(!orchestrator.advance_and_classify());
    }

    #[tokio::test]
    async fn submitted_samples_eventually_deliver_speaker_updates() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut orchestrator = Orchestrator::new(
            TrackerConfig::default(),
            OrchestratorConfig::default(),
            RingBufferConfig::default(),
            Box::new(FixedDetector(vec![Observation {
                rect_normalized: NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
                confidence: 0.9,
            }])),
            Box::new(FixedEmbedder),
            vec![Box::new(FixedClassifier), Box::new(FixedClassifier)],
            Arc::new(RecordingSpeakerSink(Arc::clone(&log))),
            Arc::new(NoopMergeSink),
        );

        for i in 0..4 {
            orchestrator.submit(Sample { t: i as f64, frame: frame(), orientation: Orientation::default() });
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let delivered = log.lock().await;
        assert!(!delivered.is_empty());
    }
}
