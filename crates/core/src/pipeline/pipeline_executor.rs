use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::detection::domain::face_detector::FaceDetector;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::recognition_pipeline::{FrameReport, PipelineError, RecognitionPipeline};
use crate::shared::settings::Settings;
use crate::video::domain::frame_source::FrameSource;

/// Configuration for one capture run.
pub struct ExecutorConfig {
    /// Frames waiting for a detector before the oldest is dropped.
    pub max_in_flight: usize,
    /// Hand every Nth captured frame to detection.
    pub skip_frames: usize,
    /// Longest wait for the next frame's detections before its slot is given up.
    pub frame_timeout: Duration,
    pub cancelled: Arc<AtomicBool>,
    /// Called on the caller's thread after every applied frame.
    pub on_report: Option<Box<dyn FnMut(&FrameReport) + Send>>,
}

impl ExecutorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_in_flight: settings.pipeline.max_in_flight.max(1),
            skip_frames: settings.recognition.skip_frames.max(1),
            frame_timeout: Duration::from_millis(settings.pipeline.frame_timeout_ms),
            cancelled: Arc::new(AtomicBool::new(false)),
            on_report: None,
        }
    }
}

/// Frame accounting for a finished run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    /// Every frame the source produced, skipped ones included.
    pub frames_captured: usize,
    pub frames_processed: usize,
    /// Evicted from a full backlog or arrived after their slot was given up.
    pub frames_dropped: usize,
    /// Unreadable frames and frames the detector rejected.
    pub frames_failed: usize,
    pub timeouts: usize,
    pub last_timestamp: Option<NaiveDateTime>,
}

/// Abstracts how frames flow from capture through detection into the
/// recognition cycle.
///
/// This is a port. Infrastructure provides concrete implementations
/// (e.g. threaded). Implementations must apply frames to `pipeline` in
/// capture order and never apply a frame older than one already applied.
pub trait PipelineExecutor: Send {
    fn execute(
        &self,
        source: Box<dyn FrameSource>,
        detectors: Vec<Box<dyn FaceDetector>>,
        pipeline: &mut RecognitionPipeline,
        logger: &mut dyn PipelineLogger,
        config: ExecutorConfig,
    ) -> Result<RunSummary, PipelineError>;
}
