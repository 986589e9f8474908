/// Thresholds for turning an EAR stream into blinks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlinkParams {
    pub threshold: f64,
    pub min_consecutive_frames: usize,
    pub max_blink_frames: usize,
}

/// Per-track blink state over successive EAR values.
///
/// A blink is a run of at least `min_consecutive_frames` and at most
/// `max_blink_frames` values below the threshold, closed by a value at or
/// above it. Longer closures (eyes shut, a printed photo with closed eyes)
/// are discarded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlinkDetector {
    closed_frames: usize,
    blinks: u32,
}

impl BlinkDetector {
    /// Feeds one EAR value; returns true when it completes a blink.
    pub fn observe(&mut self, ear: f64, params: &BlinkParams) -> bool {
        if ear < params.threshold {
            self.closed_frames += 1;
            return false;
        }
        let closed = std::mem::take(&mut self.closed_frames);
        let blinked =
            closed >= params.min_consecutive_frames && closed <= params.max_blink_frames;
        if blinked {
            self.blinks += 1;
        }
        blinked
    }

    pub fn blinks(&self) -> u32 {
        self.blinks
    }

    pub fn has_blinked(&self) -> bool {
        self.blinks > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn params(threshold: f64, min: usize, max: usize) -> BlinkParams {
        BlinkParams {
            threshold,
            min_consecutive_frames: min,
            max_blink_frames: max,
        }
    }

    fn feed(values: &[f64], p: &BlinkParams) -> BlinkDetector {
        let mut detector = BlinkDetector::default();
        for &ear in values {
            detector.observe(ear, p);
        }
        detector
    }

    #[test]
    fn test_three_closed_frames_then_open_is_a_blink() {
        let detector = feed(&[0.30, 0.31, 0.10, 0.09, 0.11, 0.32], &params(0.2, 2, 10));
        assert_eq!(detector.blinks(), 1);
    }

    #[rstest]
    #[case::single_closed_frame(&[0.3, 0.1, 0.3])]
    #[case::never_reopened(&[0.3, 0.1, 0.1, 0.1])]
    #[case::always_open(&[0.3, 0.3, 0.3])]
    #[case::closure_too_long(&[0.3, 0.1, 0.1, 0.1, 0.1, 0.3])]
    fn test_not_a_blink(#[case] values: &[f64]) {
        assert!(!feed(values, &params(0.2, 2, 3)).has_blinked());
    }

    #[test]
    fn test_value_at_threshold_counts_as_open() {
        let detector = feed(&[0.1, 0.1, 0.2], &params(0.2, 2, 10));
        assert_eq!(detector.blinks(), 1);
    }

    #[test]
    fn test_observe_reports_completing_frame() {
        let p = params(0.2, 2, 10);
        let mut detector = BlinkDetector::default();
        assert!(!detector.observe(0.1, &p));
        assert!(!detector.observe(0.1, &p));
        assert!(detector.observe(0.3, &p));
        assert!(!detector.observe(0.3, &p));
    }

    #[test]
    fn test_counts_multiple_blinks() {
        let detector = feed(&[0.1, 0.1, 0.3, 0.1, 0.1, 0.3], &params(0.2, 2, 10));
        assert_eq!(detector.blinks(), 2);
    }
}
