//! Track lifecycle: per-identity state machine, EMA appearance
//! embedding, and cost bookkeeping.

use vclip_models::{Detection, NormalizedRect, TrackId, TrackStatus};

use super::config::TrackerConfig;
use super::kalman::VisualKalmanFilter;

/// Costs recorded for a single (track, detection) association attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssociationCosts {
    pub iou: Option<f64>,
    pub appearance: Option<f64>,
    pub total: Option<f64>,
}

impl AssociationCosts {
    pub fn has_appearance(&self) -> bool {
        self.appearance.is_some()
    }

    pub fn summary(&self) -> String {
        format!(
            "iou={} appearance={} total={}",
            fmt_opt(self.iou),
            fmt_opt(self.appearance),
            fmt_opt(self.total)
        )
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.3}"),
        None => "-".to_string(),
    }
}

/// A persistent face identity: motion filter, appearance embedding, and hit
/// counters driving the PENDING/ACTIVE/INACTIVE state machine.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub status: TrackStatus,
    pub filter: VisualKalmanFilter,
    pub embedding: Vec<f32>,
    pub avg_appearance_cost: f64,
    /// Positive: consecutive hits since the last status transition.
    /// Negative: consecutive misses since the last status transition.
    pub hits: i32,
    pub iters_until_embed_update: i32,
    pub is_permanent: bool,
    pub last_costs: AssociationCosts,
}

impl Track {
    /// Create a PENDING track from an unmatched detection. The detection
    /// must carry an embedding; callers drop embedding-less detections
    /// before reaching this constructor.
    pub fn from_detection(detection: &Detection, config: &TrackerConfig) -> Self {
        let embedding = detection
            .embedding
            .clone()
            .unwrap_or_else(|| vec![0.0; vclip_models::EMBEDDING_DIM]);
        Self {
            id: TrackId::new(),
            status: TrackStatus::Pending,
            filter: VisualKalmanFilter::from_rect(&detection.rect, config.dt),
            embedding,
            avg_appearance_cost: config.max_appearance_cost / 2.0,
            hits: 1,
            iters_until_embed_update: config.iterations_per_embedding_update,
            is_permanent: false,
            last_costs: AssociationCosts::default(),
        }
    }

    /// Create a permanent track. Permanent tracks created with a detection
    /// start ACTIVE; without one, INACTIVE.
    pub fn new_permanent(
        rect: NormalizedRect,
        embedding: Vec<f32>,
        detection: Option<&Detection>,
        config: &TrackerConfig,
    ) -> Self {
        let status = if detection.is_some() {
            TrackStatus::Active
        } else {
            TrackStatus::Inactive
        };
        Self {
            id: TrackId::new(),
            status,
            filter: VisualKalmanFilter::from_rect(&rect, config.dt),
            embedding,
            avg_appearance_cost: config.max_appearance_cost / 2.0,
            hits: 0,
            iters_until_embed_update: config.iterations_per_embedding_update,
            is_permanent: true,
            last_costs: AssociationCosts::default(),
        }
    }

    pub fn rect(&self) -> NormalizedRect {
        self.filter.rect()
    }

    /// Advance the filter one step and decrement the embedding refresh
    /// counter.
    pub fn predict(&mut self) {
        self.filter.predict();
        self.iters_until_embed_update -= 1;
    }

    /// Record a matched detection: update the filter, optionally refresh the
    /// embedding via EMA, and drive the hit-based state machine.
    pub fn register_hit(
        &mut self,
        detection: &Detection,
        costs: AssociationCosts,
        config: &TrackerConfig,
    ) {
        let _ = self.filter.update(&detection.rect);
        self.last_costs = costs;

        if self.status != TrackStatus::Inactive {
            if let (true, Some(appearance)) = (costs.has_appearance(), costs.appearance) {
                let alpha = (config.embedding_alpha as f64)
                    * (detection.confidence as f64)
                    * (-appearance / (self.avg_appearance_cost + 1e-10)).exp();
                self.avg_appearance_cost += alpha * (appearance - self.avg_appearance_cost);
                if let Some(det_embedding) = &detection.embedding {
                    for (e, d) in self.embedding.iter_mut().zip(det_embedding.iter()) {
                        *e = (alpha as f32) * d + (1.0 - alpha as f32) * *e;
                    }
                }
            }
            self.iters_until_embed_update = config.iterations_per_embedding_update;
        }

        match self.status {
            TrackStatus::Pending => {
                self.hits += 1;
                if self.hits >= config.confirmation_threshold {
                    self.status = TrackStatus::Active;
                    self.hits = 0;
                }
            }
            TrackStatus::Active => {
                self.hits += 1;
            }
            TrackStatus::Inactive => {
                self.hits += 1;
                if self.hits >= config.activation_threshold {
                    self.status = TrackStatus::Active;
                    self.hits = 0;
                }
            }
        }
    }

    /// Record a missed association for this frame; drives misses toward
    /// ACTIVE->INACTIVE and eventual deletion.
    pub fn register_miss(&mut self, config: &TrackerConfig) {
        match self.status {
            TrackStatus::Active => {
                self.hits -= 1;
                if self.hits <= -config.deactivation_threshold {
                    self.status = TrackStatus::Inactive;
                    self.hits = 0;
                    self.filter.zero_velocity_and_growth();
                    self.filter
                        .damp_position_and_scale(config.velocity_damping, config.growth_damping);
                } else {
                    self.filter
                        .damp_velocity_and_growth(config.velocity_damping, config.growth_damping);
                }
            }
            TrackStatus::Inactive => {
                self.hits -= 1;
            }
            TrackStatus::Pending => {
                self.hits = 0;
            }
        }
    }

    /// Cosine distance in `[0, 2]`; `2.0` if the detection has no embedding.
    pub fn cosine_distance(&self, detection: &Detection) -> f64 {
        let Some(other) = &detection.embedding else {
            return 2.0;
        };
        cosine_distance(&self.embedding, other)
    }

    /// Axis-aligned IoU of this track's current rect and the detection's.
    pub fn iou(&self, detection: &Detection) -> f64 {
        self.rect().iou(&detection.rect)
    }

    pub fn retain(&mut self) {
        self.is_permanent = true;
    }

    pub fn release(&mut self) {
        self.is_permanent = false;
    }

    /// `(status=PENDING and hits<=0) or (not permanent and hits<=-deletionThreshold)`.
    pub fn is_deletable(&self, config: &TrackerConfig) -> bool {
        if self.status == TrackStatus::Pending && self.hits <= 0 {
            return true;
        }
        if !self.is_permanent && self.hits <= -config.deletion_threshold {
            return true;
        }
        false
    }

    /// `status=PENDING or (status=ACTIVE and iters_until_embed_update<=0)`.
    pub fn needs_embedding_update(&self) -> bool {
        self.status == TrackStatus::Pending
            || (self.status == TrackStatus::Active && self.iters_until_embed_update <= 0)
    }
}

/// `1 - dot(a,b) / (|a| * |b|)`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }
    1.0 - (dot as f64) / ((norm_a as f64) * (norm_b as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vclip_models::DetectionId;

    fn det(embedding: Vec<f32>) -> Detection {
        Detection::new(DetectionId(0), NormalizedRect::new(0.4, 0.4, 0.2, 0.2), 0.9)
            .with_embedding(embedding)
    }

    #[test]
    fn cosine_distance_self_is_zero() {
        let a = vec![1.0, 2.0, 3.0];
        assert!(cosine_distance(&a, &a).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_opposite_is_two() {
        let a = vec![1.0, 2.0, 3.0];
        let b: Vec<f32> = a.iter().map(|x| -x).collect();
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn pending_confirms_after_confirmation_threshold_hits() {
        let config = TrackerConfig::default();
        let mut e1 = vec![0.0f32; vclip_models::EMBEDDING_DIM];
        e1[0] = 1.0;
        let d = det(e1);
        let mut track = Track::from_detection(&d, &config);
        assert_eq!(track.status, TrackStatus::Pending);
        // starts at hits=1; needs confirmation_threshold total.
        for _ in 0..(config.confirmation_threshold - 1) {
            let costs = AssociationCosts {
                iou: Some(1.0),
                appearance: Some(0.0),
                total: Some(0.0),
            };
            track.register_hit(&d, costs, &config);
        }
        assert_eq!(track.status, TrackStatus::Active);
    }

    #[test]
    fn active_deactivates_after_deactivation_threshold_misses() {
        let config = TrackerConfig::default();
        let mut e1 = vec![0.0f32; vclip_models::EMBEDDING_DIM];
        e1[0] = 1.0;
        let d = det(e1);
        let mut track = Track::from_detection(&d, &config);
        track.status = TrackStatus::Active;
        track.hits = 0;
        for _ in 0..config.deactivation_threshold {
            track.register_miss(&config);
        }
        assert_eq!(track.status, TrackStatus::Inactive);
        assert_eq!(track.hits, 0);
    }

    #[test]
    fn pending_is_deletable_once_hits_reach_zero() {
        let config = TrackerConfig::default();
        let mut e1 = vec![0.0f32; vclip_models::EMBEDDING_DIM];
        e1[0] = 1.0;
        let d = det(e1);
        let mut track = Track::from_detection(&d, &config);
        track.register_miss(&config);
        assert!(track.is_deletable(&config));
    }
}
