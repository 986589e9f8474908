use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::shared::frame::Frame;

/// Decorator that drops faces smaller than `min_face_size` pixels on
/// either side before they reach the tracker.
///
/// Small faces produce unreliable embeddings and eye landmarks.
pub struct MinSizeDetector {
    inner: Box<dyn FaceDetector>,
    min_face_size: f64,
}

impl MinSizeDetector {
    pub fn new(inner: Box<dyn FaceDetector>, min_face_size: f64) -> Self {
        Self {
            inner,
            min_face_size,
        }
    }
}

impl FaceDetector for MinSizeDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        let detections = self.inner.detect(frame)?;
        let before = detections.len();
        let kept: Vec<Detection> = detections
            .into_iter()
            .filter(|d| {
                d.bbox.width() >= self.min_face_size && d.bbox.height() >= self.min_face_size
            })
            .collect();
        if kept.len() < before {
            log::debug!(
                "Frame {}: dropped {} face(s) below {}px",
                frame.index(),
                before - kept.len(),
                self.min_face_size
            );
        }
        Ok(kept)
    }
}
