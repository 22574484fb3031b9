//! Tracker — the core of the core: the three-phase
//! data-association pipeline that matches per-frame detections to tracks
//! and drives the track lifecycle state machine.

use std::collections::HashMap;

use tracing::warn;
use vclip_models::{Detection, DetectionId, MergeRequest, NormalizedRect, TrackId, TrackStatus};

use super::config::TrackerConfig;
use super::face_processor::{FaceProcessor, Frame, Orientation};
use super::rlap;
use super::track::{AssociationCosts, Track};

/// Snapshot of one track's externally-visible state, as returned by
/// `Tracker::update`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub rect: NormalizedRect,
    pub status: TrackStatus,
    pub hits: i32,
    pub cost_summary: String,
}

/// The tracker's full live population after a frame update, partitioned by
/// lifecycle status.
#[derive(Debug, Clone, Default)]
pub struct SendableTracks {
    pub tracks: Vec<TrackSnapshot>,
}

#[derive(Clone, Copy)]
enum GateMode {
    MotionThenAppearance,
    AppearanceOnly,
}

type Potential = HashMap<TrackId, HashMap<DetectionId, AssociationCosts>>;

/// Owns the three ordered sets (`active`, `pending`, `inactive`) partitioning
/// the live track population, plus the face processor used to obtain
/// per-frame detections.
pub struct Tracker {
    config: TrackerConfig,
    face_processor: FaceProcessor,
    tracks: HashMap<TrackId, Track>,
    active: Vec<TrackId>,
    pending: Vec<TrackId>,
    inactive: Vec<TrackId>,
}

impl Tracker {
    pub fn new(face_processor: FaceProcessor, config: TrackerConfig) -> Self {
        Self {
            config,
            face_processor,
            tracks: HashMap::new(),
            active: Vec::new(),
            pending: Vec::new(),
            inactive: Vec::new(),
        }
    }

    /// Register a permanent track directly (used by callers that want a
    /// track which never auto-deletes, e.g. a presenter pinned in frame).
    pub fn register_permanent(
        &mut self,
        rect: NormalizedRect,
        embedding: Vec<f32>,
        detection: Option<&Detection>,
    ) -> TrackId {
        let track = Track::new_permanent(rect, embedding, detection, &self.config);
        let id = track.id;
        match track.status {
            TrackStatus::Active => self.active.push(id),
            TrackStatus::Inactive => self.inactive.push(id),
            TrackStatus::Pending => self.pending.push(id),
        }
        self.tracks.insert(id, track);
        id
    }

    /// Run one full per-sample update cycle: predict, detect, three-phase
    /// association, hit registration, then spawn tracks for leftovers.
    pub async fn update(
        &mut self,
        frame: &Frame,
        orientation: Orientation,
    ) -> (SendableTracks, Vec<MergeRequest>) {
        // Step 1: predict every active and pending track.
        for id in self.active.iter().chain(self.pending.iter()) {
            if let Some(track) = self.tracks.get_mut(id) {
                track.predict();
            }
        }

        // Step 2: detect.
        let mut remaining = self.face_processor.detect(frame, orientation).await;

        let mut all_assignments: Vec<(TrackId, Detection, AssociationCosts)> = Vec::new();
        let mut merge_requests = Vec::new();

        // Phase A: active, motion-gated then appearance-gated.
        let mut phase_a_tracks = self.active.clone();
        let (assignments_a, leftover) = self
            .run_motion_then_appearance_phase(&mut phase_a_tracks, remaining, frame, orientation)
            .await;
        remaining = leftover;
        for id in &phase_a_tracks {
            if let Some(track) = self.tracks.get_mut(id) {
                track.register_miss(&self.config);
            }
        }
        all_assignments.extend(assignments_a);
        self.reconcile_status_moves();

        // Phase B: inactive, appearance-only.
        let mut phase_b_tracks = self.inactive.clone();
        let (assignments_b, leftover) = self
            .run_appearance_only_phase(&mut phase_b_tracks, remaining, frame, orientation)
            .await;
        remaining = leftover;
        for id in &phase_b_tracks {
            if let Some(track) = self.tracks.get_mut(id) {
                track.register_miss(&self.config);
            }
        }
        all_assignments.extend(assignments_b);
        self.apply_merge_policy_and_delete(&phase_b_tracks, &mut merge_requests);

        // Phase C: pending, motion-gated then appearance-gated.
        let mut phase_c_tracks = self.pending.clone();
        let (assignments_c, leftover) = self
            .run_motion_then_appearance_phase(&mut phase_c_tracks, remaining, frame, orientation)
            .await;
        remaining = leftover;
        for id in &phase_c_tracks {
            if let Some(track) = self.tracks.get_mut(id) {
                track.register_miss(&self.config);
            }
        }
        all_assignments.extend(assignments_c);
        self.delete_deletable_pending(&phase_c_tracks);

        // Step 4: register hits, moving tracks between sets on transition.
        for (track_id, detection, costs) in &all_assignments {
            if let Some(track) = self.tracks.get_mut(track_id) {
                track.register_hit(detection, *costs, &self.config);
            }
        }
        self.reconcile_status_moves();

        // Step 5: spawn a PENDING track for each remaining detection that
        // carries an embedding; drop the rest with a warning.
        for detection in remaining {
            if detection.embedding.is_none() {
                metrics::counter!("asd_dropped_detections_total").increment(1);
                warn!(detection_id = ?detection.id, "dropping detection without embedding, cannot spawn track");
                continue;
            }
            let track = Track::from_detection(&detection, &self.config);
            let id = track.id;
            self.pending.push(id);
            self.tracks.insert(id, track);
        }

        (self.snapshot(), merge_requests)
    }

    fn snapshot(&self) -> SendableTracks {
        let mut tracks = Vec::with_capacity(self.tracks.len());
        for (status, ids) in [
            (TrackStatus::Active, &self.active),
            (TrackStatus::Pending, &self.pending),
            (TrackStatus::Inactive, &self.inactive),
        ] {
            for id in ids {
                if let Some(track) = self.tracks.get(id) {
                    tracks.push(TrackSnapshot {
                        id: *id,
                        rect: track.rect(),
                        status,
                        hits: track.hits,
                        cost_summary: track.last_costs.summary(),
                    });
                }
            }
        }
        SendableTracks { tracks }
    }

    /// Phase A / Phase C shared logic: initial IoU gate, embed survivors,
    /// appearance re-check, RLAP. `tracks` holds the working set and is left
    /// containing only the residue (unassigned tracks) on return.
    async fn run_motion_then_appearance_phase(
        &mut self,
        tracks: &mut Vec<TrackId>,
        detections: Vec<Detection>,
        frame: &Frame,
        orientation: Orientation,
    ) -> (Vec<(TrackId, Detection, AssociationCosts)>, Vec<Detection>) {
        let mut detections = detections;
        let mut assignments = Vec::new();

        let mut potential =
            gate_and_build_potential(tracks, &detections, &self.tracks, GateMode::MotionThenAppearance, &self.config);
        short_circuit(&mut potential, tracks, &mut detections, &self.tracks, &mut assignments);

        let candidate_ids: Vec<DetectionId> = potential
            .values()
            .flat_map(|m| m.keys().copied())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        let mut to_embed: Vec<Detection> = detections
            .iter()
            .filter(|d| candidate_ids.contains(&d.id))
            .cloned()
            .collect();
        if !to_embed.is_empty() {
            self.face_processor
                .embed(frame, &mut to_embed, orientation)
                .await;
            for embedded in to_embed {
                if let Some(slot) = detections.iter_mut().find(|d| d.id == embedded.id) {
                    slot.embedding = embedded.embedding;
                }
            }
        }

        apply_appearance_filter(&mut potential, &self.tracks, &detections, &self.config);
        short_circuit(&mut potential, tracks, &mut detections, &self.tracks, &mut assignments);

        let rlap_assignments = run_rlap(tracks, &detections, &potential, &self.config);
        for (track_id, det_id, costs) in rlap_assignments {
            if let Some(pos) = tracks.iter().position(|&t| t == track_id) {
                tracks.remove(pos);
            }
            if let Some(pos) = detections.iter().position(|d| d.id == det_id) {
                let det = detections.remove(pos);
                assignments.push((track_id, det, costs));
            }
        }

        (assignments, detections)
    }

    /// Phase B logic: appearance-only gate (embeds the whole remaining set
    /// first, since nothing upstream guarantees these detections already
    /// carry embeddings).
    async fn run_appearance_only_phase(
        &mut self,
        tracks: &mut Vec<TrackId>,
        detections: Vec<Detection>,
        frame: &Frame,
        orientation: Orientation,
    ) -> (Vec<(TrackId, Detection, AssociationCosts)>, Vec<Detection>) {
        let mut detections = detections;
        let mut assignments = Vec::new();

        let missing: Vec<Detection> = detections
            .iter()
            .filter(|d| d.embedding.is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            let mut to_embed = missing;
            self.face_processor
                .embed(frame, &mut to_embed, orientation)
                .await;
            for embedded in to_embed {
                if let Some(slot) = detections.iter_mut().find(|d| d.id == embedded.id) {
                    slot.embedding = embedded.embedding;
                }
            }
        }

        let mut potential =
            gate_and_build_potential(tracks, &detections, &self.tracks, GateMode::AppearanceOnly, &self.config);
        short_circuit(&mut potential, tracks, &mut detections, &self.tracks, &mut assignments);

        let rlap_assignments = run_rlap(tracks, &detections, &potential, &self.config);
        for (track_id, det_id, costs) in rlap_assignments {
            if let Some(pos) = tracks.iter().position(|&t| t == track_id) {
                tracks.remove(pos);
            }
            if let Some(pos) = detections.iter().position(|d| d.id == det_id) {
                let det = detections.remove(pos);
                assignments.push((track_id, det, costs));
            }
        }

        (assignments, detections)
    }

    /// After hit/miss processing, move any track whose status no longer
    /// matches the set it currently lives in.
    fn reconcile_status_moves(&mut self) {
        let mut moves: Vec<(TrackId, TrackStatus)> = Vec::new();
        for (id, track) in &self.tracks {
            moves.push((*id, track.status));
        }
        self.active.retain(|id| self.tracks.get(id).map(|t| t.status) == Some(TrackStatus::Active));
        self.pending.retain(|id| self.tracks.get(id).map(|t| t.status) == Some(TrackStatus::Pending));
        self.inactive.retain(|id| self.tracks.get(id).map(|t| t.status) == Some(TrackStatus::Inactive));

        for (id, status) in moves {
            let already_placed = match status {
                TrackStatus::Active => self.active.contains(&id),
                TrackStatus::Pending => self.pending.contains(&id),
                TrackStatus::Inactive => self.inactive.contains(&id),
            };
            if already_placed {
                continue;
            }
            match status {
                TrackStatus::Active => self.active.push(id),
                TrackStatus::Pending => self.pending.push(id),
                TrackStatus::Inactive => self.inactive.push(id),
            }
        }
    }

    /// Phase B residue: tracks that missed and are now deletable trigger the
    /// merge policy before being removed.
    fn apply_merge_policy_and_delete(&mut self, residue: &[TrackId], merge_requests: &mut Vec<MergeRequest>) {
        for &victim_id in residue {
            let deletable = self
                .tracks
                .get(&victim_id)
                .map(|t| t.is_deletable(&self.config))
                .unwrap_or(false);
            if !deletable {
                continue;
            }
            if let Some(candidate) = self.find_merge_candidate(victim_id) {
                merge_requests.push(MergeRequest {
                    source_id: victim_id,
                    target_id: candidate,
                });
            }
            self.remove_track(victim_id);
        }
    }

    fn find_merge_candidate(&self, victim_id: TrackId) -> Option<TrackId> {
        let victim = self.tracks.get(&victim_id)?;
        let ceiling = next_up(self.config.max_appearance_cost);
        let mut best: Option<(TrackId, f64)> = None;
        for (&id, track) in &self.tracks {
            if id == victim_id {
                continue;
            }
            let distance = super::track::cosine_distance(&victim.embedding, &track.embedding);
            if distance > ceiling {
                continue;
            }
            if best.map(|(_, d)| distance < d).unwrap_or(true) {
                best = Some((id, distance));
            }
        }
        best.map(|(id, _)| id)
    }

    fn delete_deletable_pending(&mut self, residue: &[TrackId]) {
        for &id in residue {
            let deletable = self
                .tracks
                .get(&id)
                .map(|t| t.is_deletable(&self.config))
                .unwrap_or(false);
            if deletable {
                self.remove_track(id);
            }
        }
    }

    fn remove_track(&mut self, id: TrackId) {
        self.tracks.remove(&id);
        self.active.retain(|t| *t != id);
        self.pending.retain(|t| *t != id);
        self.inactive.retain(|t| *t != id);
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn active_ids(&self) -> &[TrackId] {
        &self.active
    }

    pub fn pending_ids(&self) -> &[TrackId] {
        &self.pending
    }

    pub fn inactive_ids(&self) -> &[TrackId] {
        &self.inactive
    }

    /// Point-in-time population counts, exposed for metrics/diagnostics.
    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            active: self.active.len(),
            pending: self.pending.len(),
            inactive: self.inactive.len(),
        }
    }

    /// Drop every non-permanent track, leaving permanent tracks and the face
    /// processor's warm embedder requests untouched. Used between unrelated
    /// shots of the same stream.
    pub fn reset(&mut self) {
        let permanent: Vec<TrackId> = self
            .tracks
            .iter()
            .filter(|(_, t)| t.is_permanent)
            .map(|(id, _)| *id)
            .collect();
        self.tracks.retain(|id, _| permanent.contains(id));
        self.active.retain(|id| permanent.contains(id));
        self.pending.retain(|id| permanent.contains(id));
        self.inactive.retain(|id| permanent.contains(id));
    }

    /// Drop every track, including permanent ones. Used when a stream's
    /// identity space is known to have changed entirely (e.g. a new source).
    pub fn hard_reset(&mut self) {
        self.tracks.clear();
        self.active.clear();
        self.pending.clear();
        self.inactive.clear();
    }
}

/// Snapshot of the tracker's population split, for logging/metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerStats {
    pub active: usize,
    pub pending: usize,
    pub inactive: usize,
}

/// Bit-level next representable `f64` above `v`, used for the merge ceiling
/// (the merge candidate's appearance-cost ceiling) without requiring a newer
/// stdlib.
fn next_up(v: f64) -> f64 {
    if v.is_nan() || v == f64::INFINITY {
        return v;
    }
    if v == 0.0 {
        return f64::MIN_POSITIVE;
    }
    let bits = v.to_bits();
    let next_bits = if v > 0.0 { bits + 1 } else { bits - 1 };
    f64::from_bits(next_bits)
}

fn gate_and_build_potential(
    tracks: &[TrackId],
    detections: &[Detection],
    tracks_map: &HashMap<TrackId, Track>,
    mode: GateMode,
    config: &TrackerConfig,
) -> Potential {
    let mut potential: Potential = HashMap::new();
    for &track_id in tracks {
        let Some(track) = tracks_map.get(&track_id) else {
            continue;
        };
        for det in detections {
            let mut costs = AssociationCosts::default();
            let keep = match mode {
                GateMode::MotionThenAppearance => {
                    let iou = track.iou(det);
                    costs.iou = Some(iou);
                    iou >= config.min_iou
                }
                GateMode::AppearanceOnly => {
                    let appearance = track.cosine_distance(det);
                    costs.appearance = Some(appearance);
                    appearance <= config.max_appearance_cost
                }
            };
            if keep {
                potential.entry(track_id).or_default().insert(det.id, costs);
            }
        }
    }
    potential
}

fn apply_appearance_filter(
    potential: &mut Potential,
    tracks_map: &HashMap<TrackId, Track>,
    detections: &[Detection],
    config: &TrackerConfig,
) {
    let det_by_id: HashMap<DetectionId, &Detection> = detections.iter().map(|d| (d.id, d)).collect();
    for (track_id, dets) in potential.iter_mut() {
        let Some(track) = tracks_map.get(track_id) else {
            dets.clear();
            continue;
        };
        dets.retain(|det_id, costs| {
            let Some(det) = det_by_id.get(det_id) else {
                return false;
            };
            let appearance = track.cosine_distance(det);
            costs.appearance = Some(appearance);
            appearance <= config.max_appearance_cost
        });
    }
    potential.retain(|_, dets| !dets.is_empty());
}

/// Commit any track with exactly one surviving candidate detection, where
/// that detection in turn has exactly one surviving candidate track, and the
/// track does not need an embedding update. Loops until a pass makes no
/// further progress, since each commit can create new unique pairs.
fn short_circuit(
    potential: &mut Potential,
    tracks: &mut Vec<TrackId>,
    detections: &mut Vec<Detection>,
    tracks_map: &HashMap<TrackId, Track>,
    assignments: &mut Vec<(TrackId, Detection, AssociationCosts)>,
) {
    loop {
        let mut committed: Option<(TrackId, DetectionId, AssociationCosts)> = None;
        for (&track_id, dets) in potential.iter() {
            if dets.len() != 1 {
                continue;
            }
            let (&det_id, &costs) = dets.iter().next().unwrap();
            let track_count = potential.values().filter(|m| m.contains_key(&det_id)).count();
            if track_count != 1 {
                continue;
            }
            let Some(track) = tracks_map.get(&track_id) else {
                continue;
            };
            if track.needs_embedding_update() {
                continue;
            }
            committed = Some((track_id, det_id, costs));
            break;
        }

        match committed {
            Some((track_id, det_id, costs)) => {
                potential.remove(&track_id);
                if let Some(pos) = tracks.iter().position(|&t| t == track_id) {
                    tracks.remove(pos);
                }
                if let Some(pos) = detections.iter().position(|d| d.id == det_id) {
                    let det = detections.remove(pos);
                    assignments.push((track_id, det, costs));
                }
            }
            None => break,
        }
    }
}

fn run_rlap(
    tracks: &[TrackId],
    detections: &[Detection],
    potential: &Potential,
    config: &TrackerConfig,
) -> Vec<(TrackId, DetectionId, AssociationCosts)> {
    if tracks.is_empty() || detections.is_empty() {
        return Vec::new();
    }
    let m = tracks.len();
    let n = detections.len();
    let mut cost = vec![f64::INFINITY; m * n];
    let mut cost_table: Vec<Option<AssociationCosts>> = vec![None; m * n];

    for (ti, track_id) in tracks.iter().enumerate() {
        let Some(candidates) = potential.get(track_id) else {
            continue;
        };
        for (di, det) in detections.iter().enumerate() {
            if let Some(costs) = candidates.get(&det.id) {
                let total = match (costs.iou, costs.appearance) {
                    (Some(iou), Some(appearance)) => {
                        config.motion_weight * iou + (1.0 - config.motion_weight) * appearance
                    }
                    (Some(iou), None) => iou,
                    (None, Some(appearance)) => appearance,
                    (None, None) => f64::INFINITY,
                };
                cost[ti * n + di] = total;
                let mut full_costs = *costs;
                full_costs.total = Some(total);
                cost_table[ti * n + di] = Some(full_costs);
            }
        }
    }

    match rlap::solve(m, n, &cost) {
        Ok(assignment) => assignment
            .rows
            .iter()
            .zip(assignment.cols.iter())
            .filter_map(|(&r, &c)| cost_table[r * n + c].map(|costs| (tracks[r], detections[c].id, costs)))
            .collect(),
        Err(status) => {
            warn!(?status, "RLAP solve failed for this phase, no pairs added");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::face_processor::{FaceDetector, FaceEmbedder, Observation};
    use async_trait::async_trait;
    use vclip_models::EMBEDDING_DIM;

    struct ScriptedDetector(Vec<Observation>);

    #[async_trait]
    impl FaceDetector for ScriptedDetector {
        async fn detect(&self, _frame: &Frame, _orientation: Orientation) -> Vec<Observation> {
            self.0.clone()
        }
    }

    struct ScriptedEmbedder(Vec<f32>);

    #[async_trait]
    impl FaceEmbedder for ScriptedEmbedder {
        async fn embed_batch(
            &self,
            _frame: &Frame,
            rects: &[NormalizedRect],
            _orientation: Orientation,
        ) -> Vec<[f32; EMBEDDING_DIM]> {
            let mut arr = [0.0f32; EMBEDDING_DIM];
            arr.copy_from_slice(&self.0);
            rects.iter().map(|_| arr).collect()
        }
    }

    fn embedding_with(index: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[index] = 1.0;
        v
    }

    fn frame() -> Frame {
        Frame {
            width: 640,
            height: 480,
            pixels: vec![],
        }
    }

    fn make_tracker(observations: Vec<Observation>, embedding: Vec<f32>) -> Tracker {
        let config = TrackerConfig::default();
        let orch = super::super::config::OrchestratorConfig::default();
        let processor = FaceProcessor::new(
            Box::new(ScriptedDetector(observations)),
            Box::new(ScriptedEmbedder(embedding)),
            config.clone(),
            orch,
        );
        Tracker::new(processor, config)
    }

    #[tokio::test]
    async fn single_steady_detection_spawns_one_pending_track() {
        let mut tracker = make_tracker(
            vec![Observation {
                rect_normalized: NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
                confidence: 0.9,
            }],
            embedding_with(0),
        );
        let (snapshot, merges) = tracker.update(&frame(), Orientation::default()).await;
        assert_eq!(snapshot.tracks.len(), 1);
        assert_eq!(snapshot.tracks[0].status, TrackStatus::Pending);
        assert!(merges.is_empty());
    }

    #[tokio::test]
    async fn steady_track_confirms_after_confirmation_threshold_hits() {
        let mut tracker = make_tracker(
            vec![Observation {
                rect_normalized: NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
                confidence: 0.9,
            }],
            embedding_with(0),
        );
        let mut last = tracker.update(&frame(), Orientation::default()).await.0;
        let config = TrackerConfig::default();
        for _ in 0..(config.confirmation_threshold + 2) {
            last = tracker.update(&frame(), Orientation::default()).await.0;
        }
        assert_eq!(last.tracks.len(), 1);
        assert_eq!(last.tracks[0].status, TrackStatus::Active);
    }

    #[tokio::test]
    async fn partition_invariant_holds_after_update() {
        let mut tracker = make_tracker(
            vec![Observation {
                rect_normalized: NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
                confidence: 0.9,
            }],
            embedding_with(0),
        );
        let _ = tracker.update(&frame(), Orientation::default()).await;
        let mut all_ids: Vec<TrackId> = tracker
            .active_ids()
            .iter()
            .chain(tracker.pending_ids())
            .chain(tracker.inactive_ids())
            .copied()
            .collect();
        let before = all_ids.len();
        all_ids.sort_by_key(|id| id.0);
        all_ids.dedup();
        assert_eq!(before, all_ids.len());
    }
}
