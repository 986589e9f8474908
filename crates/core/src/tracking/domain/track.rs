use std::collections::VecDeque;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::detection::domain::detection::Detection;
use crate::liveness::domain::liveness_engine::TrackLiveness;
use crate::liveness::domain::liveness_verdict::LivenessVerdict;
use crate::recognition::domain::identity::Identity;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::embedding::Embedding;

/// Process-unique track identifier; never reused.
pub type TrackId = u64;

/// A face followed across frames.
///
/// Owned by the tracker. Recognition writes the identity fields and
/// liveness writes the liveness state; everything else changes only
/// through association.
#[derive(Clone, Debug)]
pub struct Track {
    id: TrackId,
    bbox: BoundingBox,
    missed: usize,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    embeddings: VecDeque<Embedding>,
    embedding_capacity: usize,
    ears: VecDeque<f64>,
    ear_capacity: usize,
    latest_ear: Option<f64>,
    identity: Identity,
    confidence: f32,
    pub liveness: TrackLiveness,
}

impl Track {
    pub fn new(
        id: TrackId,
        detection: Detection,
        timestamp: NaiveDateTime,
        embedding_capacity: usize,
        ear_capacity: usize,
    ) -> Self {
        let mut track = Self {
            id,
            bbox: detection.bbox,
            missed: 0,
            created_at: timestamp,
            updated_at: timestamp,
            embeddings: VecDeque::with_capacity(embedding_capacity),
            embedding_capacity: embedding_capacity.max(1),
            ears: VecDeque::with_capacity(ear_capacity),
            ear_capacity: ear_capacity.max(1),
            latest_ear: None,
            identity: Identity::Unknown,
            confidence: 0.0,
            liveness: TrackLiveness::default(),
        };
        track.absorb(detection, timestamp);
        track
    }

    /// Takes over the box, embedding and EAR of an associated detection.
    pub fn absorb(&mut self, detection: Detection, timestamp: NaiveDateTime) {
        self.latest_ear = detection.eye_aspect_ratio();
        if let Some(ear) = self.latest_ear {
            push_bounded(&mut self.ears, ear, self.ear_capacity);
        }
        self.bbox = detection.bbox;
        push_bounded(&mut self.embeddings, detection.embedding, self.embedding_capacity);
        self.missed = 0;
        self.updated_at = timestamp;
    }

    pub fn mark_missed(&mut self) {
        self.missed += 1;
        self.latest_ear = None;
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn centroid(&self) -> (f64, f64) {
        self.bbox.centroid()
    }

    pub fn missed(&self) -> usize {
        self.missed
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> NaiveDateTime {
        self.updated_at
    }

    pub fn age(&self, now: NaiveDateTime) -> Duration {
        now - self.created_at
    }

    /// Oldest first.
    pub fn embeddings(&self) -> &VecDeque<Embedding> {
        &self.embeddings
    }

    #[cfg(test)]
    pub fn ears(&self) -> &VecDeque<f64> {
        &self.ears
    }

    /// EAR from the most recent association, if it carried eye landmarks.
    pub fn latest_ear(&self) -> Option<f64> {
        self.latest_ear
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn set_identity(&mut self, identity: Identity, confidence: f32) {
        self.identity = identity;
        self.confidence = confidence;
    }

    pub fn verdict(&self) -> LivenessVerdict {
        self.liveness.verdict()
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            track_id: self.id,
            bbox: self.bbox,
            identity: self.identity.clone(),
            confidence: self.confidence,
            liveness: self.verdict(),
        }
    }
}

/// Read-only view of a track handed to collaborators.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackSnapshot {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
    pub identity: Identity,
    pub confidence: f32,
    pub liveness: LivenessVerdict,
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, value: T, capacity: usize) {
    while buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::eye_landmarks::EyeLandmarks;
    use crate::shared::frame::test_support::at;

    fn detection(x: f64, embedding: f32) -> Detection {
        Detection::new(
            BoundingBox::new(x, 0.0, x + 50.0, 50.0),
            Embedding::new(vec![embedding]),
            None,
        )
    }

    fn open_eyes() -> EyeLandmarks {
        let eye = [(0.0, 0.0), (1.0, 1.0), (2.0, 1.0), (3.0, 0.0), (2.0, -1.0), (1.0, -1.0)];
        EyeLandmarks::new(eye, eye)
    }

    #[test]
    fn test_new_track_absorbs_first_detection() {
        let track = Track::new(7, detection(10.0, 0.5), at(9, 0, 0), 3, 10);
        assert_eq!(track.id(), 7);
        assert_eq!(track.embeddings().len(), 1);
        assert_eq!(track.missed(), 0);
        assert_eq!(track.identity(), &Identity::Unknown);
        assert_eq!(track.verdict(), LivenessVerdict::Pending);
    }

    #[test]
    fn test_embedding_buffer_never_exceeds_capacity() {
        let mut track = Track::new(1, detection(0.0, 0.0), at(9, 0, 0), 3, 10);
        for i in 1..10 {
            track.absorb(detection(0.0, i as f32), at(9, 0, i));
        }
        let values: Vec<f32> = track.embeddings().iter().map(|e| e.values()[0]).collect();
        assert_eq!(values, vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_ear_recorded_only_with_landmarks() {
        let mut track = Track::new(1, detection(0.0, 0.0), at(9, 0, 0), 3, 2);
        assert!(track.latest_ear().is_none());
        assert!(track.ears().is_empty());

        let mut with_eyes = detection(0.0, 0.0);
        with_eyes.eyes = Some(open_eyes());
        for _ in 0..3 {
            track.absorb(with_eyes.clone(), at(9, 0, 1));
        }
        assert!(track.latest_ear().is_some());
        assert_eq!(track.ears().len(), 2);
    }

    #[test]
    fn test_miss_resets_on_absorb() {
        let mut track = Track::new(1, detection(0.0, 0.0), at(9, 0, 0), 3, 10);
        track.mark_missed();
        track.mark_missed();
        assert_eq!(track.missed(), 2);
        track.absorb(detection(5.0, 0.0), at(9, 0, 2));
        assert_eq!(track.missed(), 0);
        assert_eq!(track.updated_at(), at(9, 0, 2));
        assert_eq!(track.age(at(9, 0, 2)), Duration::seconds(2));
    }

    #[test]
    fn test_snapshot_reflects_identity() {
        let mut track = Track::new(3, detection(0.0, 0.0), at(9, 0, 0), 3, 10);
        track.set_identity(Identity::known("alice"), 0.5);
        let snap = track.snapshot();
        assert_eq!(snap.track_id, 3);
        assert_eq!(snap.identity, Identity::known("alice"));
        assert_eq!(snap.confidence, 0.5);
    }
}
