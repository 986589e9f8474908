use serde::{Deserialize, Serialize};

/// Axis-aligned face box in pixel coordinates, `[x1, y1, x2, y2]`.
///
/// Serialized as a four-element array so replay files stay compact.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn centroid(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Finite coordinates and strictly positive extent.
    pub fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.width() > 0.0
            && self.height() > 0.0
    }

    /// Integer pixel bounds clamped to a `width x height` frame, or `None`
    /// if nothing of the box is inside the frame.
    pub fn clamped_pixels(&self, width: u32, height: u32) -> Option<(usize, usize, usize, usize)> {
        let clamp = |v: f64, max: u32| v.round().clamp(0.0, max as f64) as usize;
        let x1 = clamp(self.x1, width);
        let y1 = clamp(self.y1, height);
        let x2 = clamp(self.x2, width);
        let y2 = clamp(self.y2, height);
        (x2 > x1 && y2 > y1).then_some((x1, y1, x2, y2))
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Euclidean distance between two points.
pub fn point_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_centroid_and_extent() {
        let b = BoundingBox::new(10.0, 20.0, 50.0, 100.0);
        assert_eq!(b.centroid(), (30.0, 60.0));
        assert_relative_eq!(b.width(), 40.0);
        assert_relative_eq!(b.height(), 80.0);
        assert_relative_eq!(b.area(), 3200.0);
    }

    #[rstest]
    #[case(BoundingBox::new(0.0, 0.0, 10.0, 10.0), true)]
    #[case(BoundingBox::new(10.0, 0.0, 10.0, 10.0), false)]
    #[case(BoundingBox::new(0.0, 10.0, 10.0, 5.0), false)]
    #[case(BoundingBox::new(f64::NAN, 0.0, 10.0, 10.0), false)]
    #[case(BoundingBox::new(0.0, 0.0, f64::INFINITY, 10.0), false)]
    fn test_is_well_formed(#[case] b: BoundingBox, #[case] expected: bool) {
        assert_eq!(b.is_well_formed(), expected);
    }

    #[test]
    fn test_clamped_pixels_inside() {
        let b = BoundingBox::new(-5.0, 2.0, 8.0, 30.0);
        assert_eq!(b.clamped_pixels(10, 20), Some((0, 2, 8, 20)));
    }

    #[test]
    fn test_clamped_pixels_outside_is_none() {
        let b = BoundingBox::new(15.0, 15.0, 30.0, 30.0);
        assert_eq!(b.clamped_pixels(10, 10), None);
    }

    #[test]
    fn test_serde_as_array() {
        let b = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "[1.0,2.0,3.0,4.0]");
        let back: BoundingBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn test_point_distance() {
        assert_relative_eq!(point_distance((0.0, 0.0), (3.0, 4.0)), 5.0);
    }
}
