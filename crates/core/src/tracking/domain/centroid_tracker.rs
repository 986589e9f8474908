//! Centroid multi-face tracker.
//!
//! Each frame, every live track is paired with at most one detection by
//! greedy assignment on centroid distance: the globally closest remaining
//! pair is taken first, and pairs farther apart than
//! `max_association_distance` are never taken. Leftover detections start
//! new tracks; leftover tracks accumulate misses and are dropped once
//! they have missed more than `max_missed_frames` frames in a row.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;

use crate::detection::domain::detection::Detection;
use crate::shared::bounding_box::point_distance;
use crate::shared::settings::Settings;
use crate::tracking::domain::track::{Track, TrackId};

#[derive(Clone, Debug, PartialEq)]
pub struct TrackerConfig {
    pub max_missed_frames: usize,
    pub max_association_distance: f64,
    pub embedding_dim: usize,
    pub smoothing_window: usize,
    pub ear_window: usize,
}

impl From<&Settings> for TrackerConfig {
    fn from(s: &Settings) -> Self {
        Self {
            max_missed_frames: s.tracker.max_missed_frames,
            max_association_distance: s.tracker.max_association_distance,
            embedding_dim: s.recognition.embedding_dim,
            smoothing_window: s.recognition.smoothing_window,
            ear_window: s.liveness.ear_window,
        }
    }
}

/// Track ids touched by one `update`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackerUpdate {
    pub matched: Vec<TrackId>,
    pub created: Vec<TrackId>,
    pub removed: Vec<TrackId>,
}

impl TrackerUpdate {
    /// Tracks that received a detection this frame, oldest id first.
    pub fn updated(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.matched.iter().chain(self.created.iter()).copied()
    }
}

pub struct CentroidTracker {
    config: TrackerConfig,
    tracks: BTreeMap<TrackId, Track>,
    next_id: TrackId,
}

impl CentroidTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn update(&mut self, detections: Vec<Detection>, timestamp: NaiveDateTime) -> TrackerUpdate {
        let detections = self.drop_malformed(detections);

        let track_refs: Vec<(TrackId, (f64, f64))> = self
            .tracks
            .iter()
            .map(|(id, t)| (*id, t.centroid()))
            .collect();
        let det_refs: Vec<(f64, f64)> = detections.iter().map(|d| d.bbox.centroid()).collect();
        let pairs = greedy_match(&track_refs, &det_refs, self.config.max_association_distance);

        let mut update = TrackerUpdate::default();
        let mut slots: Vec<Option<Detection>> = detections.into_iter().map(Some).collect();
        let mut matched_tracks = HashSet::new();

        for (track_id, det_idx) in pairs {
            let (Some(track), Some(detection)) =
                (self.tracks.get_mut(&track_id), slots[det_idx].take())
            else {
                continue;
            };
            track.absorb(detection, timestamp);
            matched_tracks.insert(track_id);
            update.matched.push(track_id);
        }
        update.matched.sort_unstable();

        update.removed = self.age_unmatched_tracks(&matched_tracks);

        for detection in slots.into_iter().flatten() {
            if let Some(id) = self.create_track(detection, timestamp) {
                update.created.push(id);
            }
        }
        update
    }

    fn drop_malformed(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections
            .into_iter()
            .filter(|d| match d.validate(self.config.embedding_dim) {
                Ok(()) => true,
                Err(reason) => {
                    log::debug!("Dropping malformed detection: {reason:?}");
                    false
                }
            })
            .collect()
    }

    fn age_unmatched_tracks(&mut self, matched: &HashSet<TrackId>) -> Vec<TrackId> {
        for (id, track) in self.tracks.iter_mut() {
            if !matched.contains(id) {
                track.mark_missed();
            }
        }
        let max_missed = self.config.max_missed_frames;
        let removed: Vec<TrackId> = self
            .tracks
            .iter()
            .filter(|(_, t)| t.missed() > max_missed)
            .map(|(id, _)| *id)
            .collect();
        for id in &removed {
            self.tracks.remove(id);
        }
        removed
    }

    fn create_track(&mut self, detection: Detection, timestamp: NaiveDateTime) -> Option<TrackId> {
        let id = self.next_id;
        self.next_id += 1;
        if self.tracks.contains_key(&id) {
            debug_assert!(false, "track id {id} issued twice");
            log::error!("Track id {id} issued twice; skipping detection");
            return None;
        }
        let track = Track::new(
            id,
            detection,
            timestamp,
            self.config.smoothing_window,
            self.config.ear_window,
        );
        self.tracks.insert(id, track);
        Some(id)
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    /// Live tracks in ascending id order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Drops every track. Ids keep counting up.
    pub fn reset(&mut self) {
        self.tracks.clear();
    }
}

/// Greedy centroid matching: pairs sorted by ascending distance, ties
/// broken by track id then detection index, each side used at most once.
fn greedy_match(
    tracks: &[(TrackId, (f64, f64))],
    dets: &[(f64, f64)],
    max_distance: f64,
) -> Vec<(TrackId, usize)> {
    let mut pairs: Vec<(TrackId, usize, f64)> = Vec::new();
    for (ti, centroid) in tracks {
        for (di, det) in dets.iter().enumerate() {
            let distance = point_distance(*centroid, *det);
            if distance <= max_distance {
                pairs.push((*ti, di, distance));
            }
        }
    }
    pairs.sort_by(|a, b| {
        a.2.partial_cmp(&b.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
            .then(a.1.cmp(&b.1))
    });

    let mut used_tracks = HashSet::new();
    let mut used_dets = HashSet::new();
    let mut matches = Vec::new();

    for (ti, di, _) in &pairs {
        if !used_tracks.contains(ti) && !used_dets.contains(di) {
            used_tracks.insert(*ti);
            used_dets.insert(*di);
            matches.push((*ti, *di));
        }
    }
    matches
}
