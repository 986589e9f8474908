//! Six-point eye contours and the eye aspect ratio (EAR) derived from them.
//!
//! Points follow the 68-point convention: p1 and p4 are the eye corners,
//! p2/p3 the upper lid and p6/p5 the lower lid beneath them.

use serde::{Deserialize, Serialize};

use crate::shared::bounding_box::point_distance;

pub type EyeContour = [(f64, f64); 6];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EyeLandmarks {
    pub left: EyeContour,
    pub right: EyeContour,
}

impl EyeLandmarks {
    pub fn new(left: EyeContour, right: EyeContour) -> Self {
        Self { left, right }
    }

    /// Mean EAR of both eyes. Drops sharply while the eyes are closed.
    pub fn eye_aspect_ratio(&self) -> f64 {
        (eye_aspect_ratio(&self.left) + eye_aspect_ratio(&self.right)) / 2.0
    }

    pub fn is_well_formed(&self) -> bool {
        self.left
            .iter()
            .chain(self.right.iter())
            .all(|(x, y)| x.is_finite() && y.is_finite())
    }
}

/// `(|p2 - p6| + |p3 - p5|) / (2 |p1 - p4|)`, or 0 for a degenerate eye.
pub fn eye_aspect_ratio(eye: &EyeContour) -> f64 {
    let horizontal = point_distance(eye[0], eye[3]);
    if horizontal == 0.0 {
        return 0.0;
    }
    let v1 = point_distance(eye[1], eye[5]);
    let v2 = point_distance(eye[2], eye[4]);
    (v1 + v2) / (2.0 * horizontal)
}
