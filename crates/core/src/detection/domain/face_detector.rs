use thiserror::Error;

use crate::detection::domain::detection::Detection;
use crate::shared::frame::Frame;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    /// The backend cannot serve any further frames; fatal to the run.
    #[error("detector unavailable: {0}")]
    Unavailable(String),
    /// This frame could not be processed; the next one may succeed.
    #[error("detection failed for frame {frame}: {reason}")]
    Frame { frame: usize, reason: String },
}

/// Domain interface for face detection and encoding.
///
/// An empty result means no face was found, which is not an error.
/// Implementations may be stateful, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError>;
}
