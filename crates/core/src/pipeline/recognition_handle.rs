use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::NaiveDate;

use crate::attendance::domain::attendance_machine::AttendanceMachine;
use crate::attendance::domain::attendance_record::AttendanceRecord;
use crate::detection::domain::face_detector::FaceDetector;
use crate::pipeline::recognition_pipeline::PipelineError;
use crate::recognition::domain::encoding_cache::EncodingCache;
use crate::recognition::domain::gallery::Gallery;
use crate::shared::embedding::Embedding;
use crate::shared::frame::Frame;
use crate::tracking::domain::track::TrackSnapshot;

/// What a face is enrolled from.
pub enum FaceSample {
    Embedding(Embedding),
    /// An image; the largest detected face is enrolled.
    Image(Frame),
}

/// Thread-safe window onto a running [`RecognitionPipeline`].
///
/// Reads see the state as of the last completed frame. Registrations take
/// effect from the next frame.
///
/// [`RecognitionPipeline`]: crate::pipeline::recognition_pipeline::RecognitionPipeline
#[derive(Clone)]
pub struct RecognitionHandle {
    gallery: Arc<Gallery>,
    attendance: Arc<Mutex<AttendanceMachine>>,
    tracks: Arc<RwLock<Vec<TrackSnapshot>>>,
    cache: Option<Arc<dyn EncodingCache>>,
    detector: Option<Arc<Mutex<Box<dyn FaceDetector>>>>,
}

impl RecognitionHandle {
    pub(crate) fn new(
        gallery: Arc<Gallery>,
        attendance: Arc<Mutex<AttendanceMachine>>,
        tracks: Arc<RwLock<Vec<TrackSnapshot>>>,
        cache: Option<Arc<dyn EncodingCache>>,
        detector: Option<Arc<Mutex<Box<dyn FaceDetector>>>>,
    ) -> Self {
        Self {
            gallery,
            attendance,
            tracks,
            cache,
            detector,
        }
    }

    pub fn current_tracks(&self) -> Vec<TrackSnapshot> {
        self.tracks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Adds a face to the gallery and persists the gallery to the encoding
    /// cache, if one is configured. Returns the new gallery version.
    ///
    /// Concurrent registrations are applied one at a time, so the cache
    /// always holds the newest gallery. If the cache write fails the face
    /// is not registered.
    pub fn register_face(&self, identity: &str, sample: FaceSample) -> Result<u64, PipelineError> {
        let embedding = match sample {
            FaceSample::Embedding(embedding) => embedding,
            FaceSample::Image(frame) => self.largest_face(&frame)?,
        };
        let snapshot = self.gallery.register_with(
            identity,
            embedding,
            |next| -> Result<(), PipelineError> {
                if let Some(cache) = &self.cache {
                    cache.store(next.entries())?;
                }
                Ok(())
            },
        )?;
        Ok(snapshot.version())
    }

    pub fn attendance_for(&self, day: NaiveDate) -> Vec<AttendanceRecord> {
        self.attendance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attendance_for(day)
    }

    /// Enrolled names with their embedding counts.
    pub fn gallery_identities(&self) -> Vec<(String, usize)> {
        self.gallery.identities()
    }

    fn largest_face(&self, frame: &Frame) -> Result<Embedding, PipelineError> {
        let detector = self.detector.as_ref().ok_or(PipelineError::NoEnrollmentDetector)?;
        let detections = detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detect(frame)?;
        detections
            .into_iter()
            .max_by(|a, b| a.bbox.area().total_cmp(&b.bbox.area()))
            .map(|d| d.embedding)
            .ok_or(PipelineError::NoFaceInSample)
    }
}
