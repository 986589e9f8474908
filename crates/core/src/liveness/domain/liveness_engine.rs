use chrono::Duration;

use crate::liveness::domain::blink_detector::{BlinkDetector, BlinkParams};
use crate::liveness::domain::liveness_verdict::LivenessVerdict;
use crate::liveness::domain::spoof_scorer::SpoofScorer;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::settings::LivenessSettings;

#[derive(Clone, Debug, PartialEq)]
pub struct LivenessConfig {
    pub enabled: bool,
    pub blink: BlinkParams,
    /// Track age after which a track that never blinked is suspected.
    pub window: Duration,
    pub spoof_threshold: f64,
    pub spoof_check_interval: usize,
}

impl From<&LivenessSettings> for LivenessConfig {
    fn from(s: &LivenessSettings) -> Self {
        Self {
            enabled: s.enabled,
            blink: BlinkParams {
                threshold: s.blink_threshold,
                min_consecutive_frames: s.min_consecutive_frames,
                max_blink_frames: s.max_blink_frames,
            },
            window: s.liveness_window(),
            spoof_threshold: s.spoof_threshold,
            spoof_check_interval: s.spoof_check_interval.max(1),
        }
    }
}

/// Liveness evidence accumulated on one track.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackLiveness {
    verdict: LivenessVerdict,
    blink: BlinkDetector,
    spoof_score: f64,
    updates: usize,
}

impl TrackLiveness {
    pub fn verdict(&self) -> LivenessVerdict {
        self.verdict
    }

    pub fn blinks(&self) -> u32 {
        self.blink.blinks()
    }

    /// Running maximum of the spoof scores seen so far.
    pub fn spoof_score(&self) -> f64 {
        self.spoof_score
    }
}

/// What the engine sees of a track on one frame.
pub struct LivenessInput<'a> {
    /// EAR for this frame, if the detector reported eye landmarks.
    pub ear: Option<f64>,
    pub frame: &'a Frame,
    pub bbox: &'a BoundingBox,
    pub track_age: Duration,
}

/// Fuses blink evidence and spoof scores into a per-track verdict.
///
/// Precedence on every update:
/// 1. accumulated spoof score at or above the threshold: suspected, for good
/// 2. at least one blink: live
/// 3. older than the liveness window: suspected
/// 4. otherwise pending
pub struct LivenessEngine {
    config: LivenessConfig,
    scorer: Box<dyn SpoofScorer>,
}

impl LivenessEngine {
    pub fn new(config: LivenessConfig, scorer: Box<dyn SpoofScorer>) -> Self {
        Self { config, scorer }
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn update(&self, state: &mut TrackLiveness, input: LivenessInput<'_>) -> LivenessVerdict {
        if !self.config.enabled {
            state.verdict = LivenessVerdict::Live;
            return state.verdict;
        }
        if state.verdict == LivenessVerdict::SpoofSuspected {
            return state.verdict;
        }

        if state.updates % self.config.spoof_check_interval == 0 {
            if let Some(score) = self.scorer.score(input.frame, input.bbox) {
                state.spoof_score = state.spoof_score.max(score);
            }
        }
        state.updates += 1;

        if let Some(ear) = input.ear {
            state.blink.observe(ear, &self.config.blink);
        }

        state.verdict = if state.spoof_score >= self.config.spoof_threshold {
            LivenessVerdict::SpoofSuspected
        } else if state.blink.has_blinked() {
            LivenessVerdict::Live
        } else if input.track_age > self.config.window {
            LivenessVerdict::SpoofSuspected
        } else {
            LivenessVerdict::Pending
        };
        state.verdict
    }
}
