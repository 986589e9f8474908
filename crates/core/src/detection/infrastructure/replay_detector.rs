use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::shared::frame::Frame;

/// Replays pre-computed detection results by frame index.
///
/// Lets the pipeline run against detector output captured elsewhere
/// (an offline encoder, a recorded session) without linking a model.
/// Frames missing from the file yield no faces.
#[derive(Clone)]
pub struct ReplayDetector {
    frames: Arc<HashMap<usize, Vec<Detection>>>,
}

#[derive(Deserialize)]
struct ReplayFile {
    frames: HashMap<usize, Vec<Detection>>,
}

impl ReplayDetector {
    pub fn new(frames: Arc<HashMap<usize, Vec<Detection>>>) -> Self {
        Self { frames }
    }

    /// Loads `{"frames": {"<index>": [detection, ...]}}` from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, DetectionError> {
        let json = fs::read_to_string(path).map_err(|e| {
            DetectionError::Unavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: ReplayFile = serde_json::from_str(&json).map_err(|e| {
            DetectionError::Unavailable(format!("cannot parse {}: {e}", path.display()))
        })?;
        log::info!(
            "Loaded replayed detections for {} frames from {}",
            file.frames.len(),
            path.display()
        );
        Ok(Self::new(Arc::new(file.frames)))
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl FaceDetector for ReplayDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        Ok(self.frames.get(&frame.index()).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::embedding::Embedding;
    use crate::shared::frame::test_support::{at, blank_frame};

    fn detection(x: f64) -> Detection {
        Detection::new(
            BoundingBox::new(x, 20.0, x + 50.0, 70.0),
            Embedding::new(vec![0.1, 0.2]),
            None,
        )
    }

    #[test]
    fn test_returns_recorded_detections_for_known_frame() {
        let dets = vec![detection(10.0), detection(60.0)];
        let mut detector = ReplayDetector::new(Arc::new(HashMap::from([(0, dets.clone())])));

        let result = detector.detect(&blank_frame(0, at(9, 0, 0))).unwrap();

        assert_eq!(result, dets);
    }

    #[test]
    fn test_unknown_frame_yields_no_faces() {
        let mut detector = ReplayDetector::new(Arc::new(HashMap::new()));
        assert!(detector.detect(&blank_frame(5, at(9, 0, 0))).unwrap().is_empty());
    }

    #[test]
    fn test_clones_share_recordings() {
        let detector = ReplayDetector::new(Arc::new(HashMap::from([(1, vec![detection(0.0)])])));
        let mut other = detector.clone();
        assert_eq!(other.detect(&blank_frame(1, at(9, 0, 0))).unwrap().len(), 1);
        assert_eq!(detector.frame_count(), 1);
    }

    #[test]
    fn test_from_path_parses_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.json");
        fs::write(
            &path,
            r#"{"frames": {"2": [{"bbox": [0, 0, 60, 60], "embedding": [0.0, 1.0]}]}}"#,
        )
        .unwrap();

        let mut detector = ReplayDetector::from_path(&path).unwrap();
        let result = detector.detect(&blank_frame(2, at(9, 0, 0))).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].embedding.values(), &[0.0, 1.0]);
    }

    #[test]
    fn test_from_path_missing_file_is_unavailable() {
        let result = ReplayDetector::from_path(Path::new("/nonexistent/detections.json"));
        assert!(matches!(result, Err(DetectionError::Unavailable(_))));
    }
}
