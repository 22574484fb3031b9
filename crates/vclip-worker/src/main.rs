//! ASD orchestrator binary.
//!
//! Wires the tracking-and-temporal-fusion engine to a concrete face
//! detector/embedder/classifier and runs until shut down. The three ML
//! models and the camera/stream frame source are out of this crate's scope:
//! `main` here binds placeholder implementations at the same seam a real
//! deployment would bind its actual models, so the wiring itself stays
//! exercised and observable even without them.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use vclip_media::{Frame, Observation, Orientation, SpeakerUpdate};
use vclip_models::{MergeRequest, NormalizedRect, EMBEDDING_DIM};
use vclip_worker::{BoxFuture, Classifier, MergeSink, Orchestrator, SpeakerSink, WorkerConfig, WorkerError};

/// Detects nothing. Stands in for a real face detector until one is bound.
struct UnboundDetector;

#[async_trait]
impl vclip_media::FaceDetector for UnboundDetector {
    async fn detect(&self, _frame: &Frame, _orientation: Orientation) -> Vec<Observation> {
        Vec::new()
    }
}

/// Embeds nothing to a zero vector. Stands in for a real face embedder.
struct UnboundEmbedder;

#[async_trait]
impl vclip_media::FaceEmbedder for UnboundEmbedder {
    async fn embed_batch(
        &self,
        _frame: &Frame,
        rects: &[NormalizedRect],
        _orientation: Orientation,
    ) -> Vec<[f32; EMBEDDING_DIM]> {
        rects.iter().map(|_| [0.0f32; EMBEDDING_DIM]).collect()
    }
}

/// Scores every chunk as silence. Stands in for a real speaker classifier.
struct UnboundClassifier;

#[async_trait]
impl Classifier for UnboundClassifier {
    async fn predict(&self, window: &[Vec<f32>], _height: usize, _width: usize) -> Vec<f32> {
        vec![0.0; window.len()]
    }
}

struct TracingSpeakerSink;

impl SpeakerSink for TracingSpeakerSink {
    fn emit(&self, updates: Vec<SpeakerUpdate>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            for update in updates {
                info!(
                    track_id = %update.track.id,
                    status = ?update.track.status,
                    score = ?update.last_score,
                    "speaker update"
                );
            }
        })
    }
}

struct TracingMergeSink;

impl MergeSink for TracingMergeSink {
    fn emit(&self, merges: Vec<MergeRequest>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            for merge in merges {
                info!(source = %merge.source_id, target = %merge.target_id, "track merge");
            }
        })
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    vclip_worker::logging::init_tracing();

    info!("starting vclip-worker");

    let config = WorkerConfig::from_env();
    info!(?config, "loaded configuration");

    if let Err(e) = install_metrics_exporter(&config.metrics_addr) {
        error!(error = %e, "failed to install metrics exporter, continuing without it");
    }

    let pool_size = config.orchestrator.model_pool_size;
    let classifiers: Vec<Box<dyn Classifier>> =
        (0..pool_size).map(|_| Box::new(UnboundClassifier) as Box<dyn Classifier>).collect();

    let _orchestrator = Orchestrator::new(
        config.tracker,
        config.orchestrator,
        config.ring_buffer,
        Box::new(UnboundDetector),
        Box::new(UnboundEmbedder),
        classifiers,
        Arc::new(TracingSpeakerSink),
        Arc::new(TracingMergeSink),
    );

    info!("orchestrator ready, waiting for shutdown signal");
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received, exiting");
}

fn install_metrics_exporter(addr: &str) -> Result<(), WorkerError> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let socket: std::net::SocketAddr =
        addr.parse().map_err(|e| WorkerError::config(format!("invalid metrics_addr {addr}: {e}")))?;

    PrometheusBuilder::new()
        .with_http_listener(socket)
        .install()
        .map_err(|e| WorkerError::MetricsInit(e.to_string()))
}
