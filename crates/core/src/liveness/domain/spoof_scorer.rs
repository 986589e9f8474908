use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Scores how likely a face crop is a flat reproduction (photo, screen).
///
/// Returns a value in `[0, 1]`, higher meaning more likely spoofed, or
/// `None` when the crop is too small or lies outside the frame.
pub trait SpoofScorer: Send + Sync {
    fn score(&self, frame: &Frame, bbox: &BoundingBox) -> Option<f64>;
}
