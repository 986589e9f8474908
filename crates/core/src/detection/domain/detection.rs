use serde::{Deserialize, Serialize};

use crate::detection::domain::eye_landmarks::EyeLandmarks;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::embedding::Embedding;

/// One face in one frame, as reported by the external detector/encoder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eyes: Option<EyeLandmarks>,
}

/// Why a detection was rejected before association.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Malformed {
    BoundingBox,
    Embedding,
    EmbeddingDimension { expected: usize, actual: usize },
    EyeLandmarks,
}

impl Detection {
    pub fn new(bbox: BoundingBox, embedding: Embedding, eyes: Option<EyeLandmarks>) -> Self {
        Self {
            bbox,
            embedding,
            eyes,
        }
    }

    pub fn validate(&self, embedding_dim: usize) -> Result<(), Malformed> {
        if !self.bbox.is_well_formed() {
            return Err(Malformed::BoundingBox);
        }
        if !self.embedding.is_well_formed() {
            return Err(Malformed::Embedding);
        }
        if self.embedding.dim() != embedding_dim {
            return Err(Malformed::EmbeddingDimension {
                expected: embedding_dim,
                actual: self.embedding.dim(),
            });
        }
        if self.eyes.as_ref().is_some_and(|e| !e.is_well_formed()) {
            return Err(Malformed::EyeLandmarks);
        }
        Ok(())
    }

    /// EAR for this frame, when the detector supplied eye landmarks.
    pub fn eye_aspect_ratio(&self) -> Option<f64> {
        self.eyes.as_ref().map(EyeLandmarks::eye_aspect_ratio)
    }
}
