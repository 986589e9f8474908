use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::pipeline::pipeline_executor::{ExecutorConfig, PipelineExecutor, RunSummary};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::recognition_pipeline::{PipelineError, RecognitionPipeline};
use crate::shared::frame::Frame;
use crate::video::domain::frame_source::{Captured, FrameSource};

/// A frame handed to detection, numbered in capture order.
struct Job {
    seq: usize,
    frame: Frame,
}

struct Detected {
    seq: usize,
    frame: Frame,
    result: Result<Vec<Detection>, DetectionError>,
}

#[derive(Default)]
struct CaptureStats {
    captured: usize,
    dropped: usize,
    unreadable: usize,
}

/// Runs capture and detection on dedicated threads and the recognition
/// cycle on the caller's thread.
///
/// Layout: `capture → [bounded queue] → N detect workers → main [reorder/apply]`
///
/// Capture never blocks on a full queue: it evicts the oldest waiting frame
/// instead. Results are applied strictly in capture order; a result that
/// arrives after its slot was given up is discarded.
pub struct ThreadedPipelineExecutor;

impl ThreadedPipelineExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ThreadedPipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor for ThreadedPipelineExecutor {
    fn execute(
        &self,
        source: Box<dyn FrameSource>,
        detectors: Vec<Box<dyn FaceDetector>>,
        pipeline: &mut RecognitionPipeline,
        logger: &mut dyn PipelineLogger,
        mut config: ExecutorConfig,
    ) -> Result<RunSummary, PipelineError> {
        if detectors.is_empty() {
            return Err(DetectionError::Unavailable("no detection workers".to_string()).into());
        }
        let workers = detectors.len();
        let skip = config.skip_frames.max(1);
        let total = source.len_hint().map(|n| n.div_ceil(skip));

        let (job_tx, job_rx) = crossbeam_channel::bounded::<Job>(config.max_in_flight.max(1));
        let (result_tx, result_rx) = crossbeam_channel::bounded::<Detected>(workers);
        let (drop_tx, drop_rx) = crossbeam_channel::unbounded::<usize>();

        let capture_handle = spawn_capture(
            source,
            job_tx,
            job_rx.clone(),
            drop_tx,
            skip,
            config.cancelled.clone(),
        );
        let worker_handles: Vec<_> = detectors
            .into_iter()
            .map(|detector| {
                spawn_worker(
                    detector,
                    job_rx.clone(),
                    result_tx.clone(),
                    config.cancelled.clone(),
                )
            })
            .collect();
        drop(job_rx);
        drop(result_tx);

        let mut summary = RunSummary::default();
        let main_result = run_main_loop(
            &result_rx,
            &drop_rx,
            pipeline,
            logger,
            &mut config,
            total,
            &mut summary,
        );
        if main_result.is_err() {
            config.cancelled.store(true, Ordering::Relaxed);
        }
        drop(result_rx);
        drop(drop_rx);

        let stats = join_threads(capture_handle, worker_handles, main_result.err())?;
        summary.frames_captured = stats.captured;
        summary.frames_dropped += stats.dropped;
        summary.frames_failed += stats.unreadable;
        if summary.frames_dropped > 0 {
            logger.count("dropped_frames", summary.frames_dropped);
        }
        Ok(summary)
    }
}

fn spawn_capture(
    mut source: Box<dyn FrameSource>,
    job_tx: Sender<Job>,
    evict_rx: Receiver<Job>,
    drop_tx: Sender<usize>,
    skip: usize,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<CaptureStats> {
    std::thread::spawn(move || {
        let mut stats = CaptureStats::default();
        let mut seq = 0;
        for captured in source.capture(skip) {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            stats.captured += 1;
            let frame = match captured {
                Captured::Skipped => continue,
                Captured::Frame(Ok(frame)) => frame,
                Captured::Frame(Err(e)) => {
                    log::warn!("Skipping unreadable frame: {e}");
                    stats.unreadable += 1;
                    continue;
                }
            };

            let mut job = Job { seq, frame };
            seq += 1;
            loop {
                match job_tx.try_send(job) {
                    Ok(()) => break,
                    Err(TrySendError::Full(back)) => {
                        job = back;
                        if let Ok(oldest) = evict_rx.try_recv() {
                            log::warn!(
                                "Detection backlog full, dropping frame {}",
                                oldest.frame.index()
                            );
                            stats.dropped += 1;
                            if drop_tx.send(oldest.seq).is_err() {
                                return stats;
                            }
                        }
                    }
                    Err(TrySendError::Disconnected(_)) => return stats,
                }
            }
        }
        stats
    })
}

fn spawn_worker(
    mut detector: Box<dyn FaceDetector>,
    job_rx: Receiver<Job>,
    result_tx: Sender<Detected>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<Box<dyn FaceDetector>> {
    std::thread::spawn(move || {
        for Job { seq, frame } in job_rx {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            let result = detector.detect(&frame);
            if result_tx.send(Detected { seq, frame, result }).is_err() {
                break;
            }
        }
        detector
    })
}

/// Receives detection results, restores capture order and applies each
/// frame to the pipeline.
fn run_main_loop(
    result_rx: &Receiver<Detected>,
    drop_rx: &Receiver<usize>,
    pipeline: &mut RecognitionPipeline,
    logger: &mut dyn PipelineLogger,
    config: &mut ExecutorConfig,
    total: Option<usize>,
    summary: &mut RunSummary,
) -> Result<(), PipelineError> {
    let mut next_seq = 0;
    let mut pending: BTreeMap<usize, Detected> = BTreeMap::new();
    let mut evicted: BTreeSet<usize> = BTreeSet::new();
    // Set while later results are buffered behind a missing `next_seq`.
    let mut stalled_since: Option<Instant> = None;

    loop {
        if config.cancelled.load(Ordering::Relaxed) {
            log::info!("Run cancelled");
            return Ok(());
        }

        let wait = match stalled_since {
            Some(since) => config.frame_timeout.saturating_sub(since.elapsed()),
            None => config.frame_timeout,
        };
        match result_rx.recv_timeout(wait) {
            Ok(detected) if detected.seq < next_seq => {
                log::debug!("Discarding late result for frame {}", detected.frame.index());
                summary.frames_dropped += 1;
            }
            Ok(detected) => {
                pending.insert(detected.seq, detected);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        evicted.extend(drop_rx.try_iter());
        let head = next_seq;
        flush_ready(
            &mut pending,
            &mut evicted,
            &mut next_seq,
            pipeline,
            logger,
            config,
            total,
            summary,
        )?;
        stalled_since = match stalled_since {
            _ if pending.is_empty() => None,
            Some(since) if next_seq == head => Some(since),
            _ => Some(Instant::now()),
        };

        if !stalled_since.is_some_and(|since| since.elapsed() >= config.frame_timeout) {
            continue;
        }
        if let Some(&lowest) = pending.keys().next() {
            log::warn!(
                "No detections within {:?}, giving up on {} frame(s)",
                config.frame_timeout,
                lowest - next_seq
            );
            summary.timeouts += 1;
            logger.count("timeouts", 1);
            next_seq = lowest;
            flush_ready(
                &mut pending,
                &mut evicted,
                &mut next_seq,
                pipeline,
                logger,
                config,
                total,
                summary,
            )?;
        }
        stalled_since = (!pending.is_empty()).then(Instant::now);
    }

    // Workers are done; whatever is left can be applied in order.
    for (_, detected) in std::mem::take(&mut pending) {
        apply(detected, pipeline, logger, config, total, summary)?;
    }
    Ok(())
}

/// Applies every buffered result that is next in capture order, skipping
/// sequence numbers evicted by capture.
#[allow(clippy::too_many_arguments)]
fn flush_ready(
    pending: &mut BTreeMap<usize, Detected>,
    evicted: &mut BTreeSet<usize>,
    next_seq: &mut usize,
    pipeline: &mut RecognitionPipeline,
    logger: &mut dyn PipelineLogger,
    config: &mut ExecutorConfig,
    total: Option<usize>,
    summary: &mut RunSummary,
) -> Result<(), PipelineError> {
    loop {
        if evicted.remove(next_seq) {
            *next_seq += 1;
        } else if let Some(detected) = pending.remove(next_seq) {
            *next_seq += 1;
            apply(detected, pipeline, logger, config, total, summary)?;
        } else {
            break;
        }
    }
    *evicted = evicted.split_off(next_seq);
    Ok(())
}

fn apply(
    detected: Detected,
    pipeline: &mut RecognitionPipeline,
    logger: &mut dyn PipelineLogger,
    config: &mut ExecutorConfig,
    total: Option<usize>,
    summary: &mut RunSummary,
) -> Result<(), PipelineError> {
    let detections = match detected.result {
        Ok(detections) => detections,
        Err(e @ DetectionError::Unavailable(_)) => return Err(e.into()),
        Err(e @ DetectionError::Frame { .. }) => {
            log::warn!("{e}");
            summary.frames_failed += 1;
            logger.count("failed_frames", 1);
            return Ok(());
        }
    };

    let report = pipeline.process(&detected.frame, detections, logger)?;
    summary.frames_processed += 1;
    summary.last_timestamp = Some(report.timestamp);
    if let Some(callback) = config.on_report.as_mut() {
        callback(&report);
    }
    logger.progress(summary.frames_processed, total);
    Ok(())
}

/// Joins all pipeline threads and coalesces the first error encountered.
fn join_threads(
    capture_handle: JoinHandle<CaptureStats>,
    worker_handles: Vec<JoinHandle<Box<dyn FaceDetector>>>,
    mut first_error: Option<PipelineError>,
) -> Result<CaptureStats, PipelineError> {
    fn set_if_none(slot: &mut Option<PipelineError>, err: PipelineError) {
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    let stats = match capture_handle.join() {
        Ok(stats) => stats,
        Err(_) => {
            set_if_none(&mut first_error, PipelineError::ThreadPanicked("capture"));
            CaptureStats::default()
        }
    };

    for handle in worker_handles {
        if handle.join().is_err() {
            set_if_none(&mut first_error, PipelineError::ThreadPanicked("detection worker"));
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}
