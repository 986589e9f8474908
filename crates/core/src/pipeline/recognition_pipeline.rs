use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::attendance::domain::attendance_machine::{AttendanceConfig, AttendanceMachine};
use crate::attendance::domain::attendance_record::AttendanceEvent;
use crate::attendance::domain::attendance_store::{AttendanceStore, DetectionRecord, StoreError};
use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::liveness::domain::liveness_engine::{LivenessConfig, LivenessEngine, LivenessInput};
use crate::liveness::domain::liveness_verdict::LivenessVerdict;
use crate::liveness::domain::spoof_scorer::SpoofScorer;
use crate::notification::domain::notifier::{AlertEvent, Notifier};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::recognition_handle::RecognitionHandle;
use crate::recognition::domain::encoding_cache::{CacheError, EncodingCache};
use crate::recognition::domain::gallery::{Gallery, GalleryError, GallerySnapshot};
use crate::recognition::domain::identity::MatchResult;
use crate::recognition::domain::identity_matcher::IdentityMatcher;
use crate::recognition::domain::identity_voter::IdentityVoter;
use crate::shared::frame::Frame;
use crate::shared::settings::{ConfigError, Settings};
use crate::tracking::domain::centroid_tracker::{CentroidTracker, TrackerConfig};
use crate::tracking::domain::track::{Track, TrackId, TrackSnapshot};
use crate::video::domain::frame_source::SourceError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Gallery(#[from] GalleryError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no face found in the enrollment image")]
    NoFaceInSample,
    #[error("image enrollment needs a face detector")]
    NoEnrollmentDetector,
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

/// What one frame cycle produced.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub frame_index: usize,
    pub timestamp: NaiveDateTime,
    pub tracks: Vec<TrackSnapshot>,
    pub events: Vec<AttendanceEvent>,
    pub removed: Vec<TrackId>,
}

/// One track's outcome for the current frame, waiting to be persisted.
struct Sighting {
    record: DetectionRecord,
    confidence: f32,
    alerts: Vec<AlertEvent>,
}

/// The per-frame recognition cycle.
///
/// `process` runs, in order: association, identity matching and voting,
/// liveness and publication of the track snapshot, then alerts, detection
/// persistence, attendance and the absence sweep. It is
/// driven from a single thread; collaborators observe it through
/// [`RecognitionHandle`].
pub struct RecognitionPipeline {
    tracker: CentroidTracker,
    matcher: IdentityMatcher,
    voter: IdentityVoter,
    liveness: LivenessEngine,
    gallery: Arc<Gallery>,
    attendance: Arc<Mutex<AttendanceMachine>>,
    attendance_enabled: bool,
    published: Arc<RwLock<Vec<TrackSnapshot>>>,
    store: Arc<dyn AttendanceStore>,
    notifier: Arc<dyn Notifier>,
    cache: Option<Arc<dyn EncodingCache>>,
    enrollment_detector: Option<Arc<Mutex<Box<dyn FaceDetector>>>>,
    seeded_day: Option<NaiveDate>,
    unknown_alerted: HashSet<TrackId>,
    settle_after: usize,
}

impl RecognitionPipeline {
    pub fn new(
        settings: &Settings,
        gallery: Arc<Gallery>,
        store: Arc<dyn AttendanceStore>,
        notifier: Arc<dyn Notifier>,
        scorer: Box<dyn SpoofScorer>,
    ) -> Result<Self, PipelineError> {
        settings.validate()?;
        let threshold = settings.recognition.threshold;
        let attendance = AttendanceMachine::new(
            AttendanceConfig::from(&settings.attendance),
            store.clone(),
        );
        Ok(Self {
            tracker: CentroidTracker::new(TrackerConfig::from(settings)),
            matcher: IdentityMatcher::new(threshold),
            voter: IdentityVoter::new(threshold),
            liveness: LivenessEngine::new(LivenessConfig::from(&settings.liveness), scorer),
            gallery,
            attendance: Arc::new(Mutex::new(attendance)),
            attendance_enabled: settings.attendance.enabled,
            published: Arc::new(RwLock::new(Vec::new())),
            store,
            notifier,
            cache: None,
            enrollment_detector: None,
            seeded_day: None,
            unknown_alerted: HashSet::new(),
            settle_after: settings.recognition.smoothing_window,
        })
    }

    /// Persist registrations made through the handle to `cache`.
    pub fn with_encoding_cache(mut self, cache: Arc<dyn EncodingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Detector used by the handle to enroll faces from images.
    pub fn with_enrollment_detector(mut self, detector: Box<dyn FaceDetector>) -> Self {
        self.enrollment_detector = Some(Arc::new(Mutex::new(detector)));
        self
    }

    pub fn handle(&self) -> RecognitionHandle {
        RecognitionHandle::new(
            self.gallery.clone(),
            self.attendance.clone(),
            self.published.clone(),
            self.cache.clone(),
            self.enrollment_detector.clone(),
        )
    }

    pub fn process(
        &mut self,
        frame: &Frame,
        detections: Vec<Detection>,
        logger: &mut dyn PipelineLogger,
    ) -> Result<FrameReport, PipelineError> {
        let now = frame.timestamp();
        self.seed_attendance(now.date())?;

        let t0 = Instant::now();
        let update = self.tracker.update(detections, now);
        logger.timing("track", elapsed_ms(t0));
        for id in &update.removed {
            self.unknown_alerted.remove(id);
        }

        let snapshot = self.gallery.snapshot();
        let updated: Vec<TrackId> = update.updated().collect();
        let mut sightings = Vec::with_capacity(updated.len());

        for id in updated {
            let Some(track) = self.tracker.get_mut(id) else {
                continue;
            };

            let t1 = Instant::now();
            let latest = identify(&self.matcher, &self.voter, &snapshot, track);
            logger.timing("match", elapsed_ms(t1));

            let t2 = Instant::now();
            let previous = track.verdict();
            let verdict = assess_liveness(&self.liveness, track, frame, now);
            logger.timing("liveness", elapsed_ms(t2));

            let alerts = alerts_for(
                track,
                previous,
                !snapshot.is_empty() && track.embeddings().len() >= self.settle_after,
                &mut self.unknown_alerted,
                now,
            );
            sightings.push(Sighting {
                record: DetectionRecord {
                    track_id: id,
                    identity: track.identity().clone(),
                    distance: latest.distance.is_finite().then_some(latest.distance),
                    liveness: verdict,
                    timestamp: now,
                },
                confidence: track.confidence(),
                alerts,
            });
        }

        let tracks: Vec<TrackSnapshot> = self.tracker.tracks().map(Track::snapshot).collect();
        logger.metric("tracks", tracks.len() as f64);
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = tracks.clone();

        // Track state is complete for this frame; a store failure from here
        // on is reported after every sighting has been handled.
        let mut first_error: Option<PipelineError> = None;
        let mut events = Vec::new();
        for sighting in sightings {
            for alert in &sighting.alerts {
                self.notifier.notify(alert);
            }
            if let Err(e) = self.store.record_detection(&sighting.record) {
                log::warn!("Failed to record detection for track {}: {e}", sighting.record.track_id);
                first_error.get_or_insert(e.into());
            }

            if self.attendance_enabled {
                let t3 = Instant::now();
                match self.apply_attendance(&sighting, now) {
                    Ok(Some(event)) => {
                        logger.count("check_ins", 1);
                        events.push(event);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
                logger.timing("attendance", elapsed_ms(t3));
            }
        }

        if self.attendance_enabled {
            match self.lock_attendance().sweep_absences(now) {
                Ok(checked_out) => {
                    logger.count("check_outs", checked_out.len());
                    events.extend(checked_out);
                }
                Err(e) => {
                    first_error.get_or_insert(e.into());
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        Ok(FrameReport {
            frame_index: frame.index(),
            timestamp: now,
            tracks,
            events,
            removed: update.removed,
        })
    }

    /// Checks out everyone still present; call when the capture session ends.
    pub fn end_session(&mut self, now: NaiveDateTime) -> Result<Vec<AttendanceEvent>, PipelineError> {
        if !self.attendance_enabled {
            return Ok(Vec::new());
        }
        Ok(self.lock_attendance().end_session(now)?)
    }

    fn seed_attendance(&mut self, day: NaiveDate) -> Result<(), PipelineError> {
        if !self.attendance_enabled || self.seeded_day == Some(day) {
            return Ok(());
        }
        self.lock_attendance().seed(day)?;
        self.seeded_day = Some(day);
        Ok(())
    }

    fn apply_attendance(
        &self,
        sighting: &Sighting,
        now: NaiveDateTime,
    ) -> Result<Option<AttendanceEvent>, PipelineError> {
        let Some(name) = sighting.record.identity.name() else {
            return Ok(None);
        };
        let mut machine = self.lock_attendance();
        match sighting.record.liveness {
            LivenessVerdict::SpoofSuspected => Ok(None),
            LivenessVerdict::Pending => {
                machine.mark_seen(name, now);
                Ok(None)
            }
            LivenessVerdict::Live => {
                machine.mark_seen(name, now);
                Ok(machine.on_verified(name, sighting.confidence, now)?)
            }
        }
    }

    fn lock_attendance(&self) -> MutexGuard<'_, AttendanceMachine> {
        self.attendance.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Matches every buffered embedding of `track`, lets the voter decide the
/// reported identity, and returns the match of the newest embedding.
fn identify(
    matcher: &IdentityMatcher,
    voter: &IdentityVoter,
    snapshot: &GallerySnapshot,
    track: &mut Track,
) -> MatchResult {
    let results: Vec<MatchResult> = track
        .embeddings()
        .iter()
        .map(|e| matcher.match_embedding(snapshot, e))
        .collect();
    if let Some(outcome) = voter.vote(&results) {
        track.set_identity(outcome.identity, outcome.confidence);
    }
    results.last().cloned().unwrap_or_else(MatchResult::no_gallery)
}

/// A spoof alert when the verdict just flipped, and one unknown-face alert
/// per track once its identity has settled on unknown.
fn alerts_for(
    track: &Track,
    previous: LivenessVerdict,
    settled: bool,
    unknown_alerted: &mut HashSet<TrackId>,
    now: NaiveDateTime,
) -> Vec<AlertEvent> {
    let mut alerts = Vec::new();
    if track.verdict() == LivenessVerdict::SpoofSuspected
        && previous != LivenessVerdict::SpoofSuspected
    {
        alerts.push(AlertEvent::SpoofSuspected {
            track_id: track.id(),
            identity: track.identity().name().map(str::to_string),
            score: track.liveness.spoof_score(),
            at: now,
        });
    }
    if settled && !track.identity().is_known() && unknown_alerted.insert(track.id()) {
        alerts.push(AlertEvent::UnknownFace {
            track_id: track.id(),
            at: now,
        });
    }
    alerts
}

fn assess_liveness(
    engine: &LivenessEngine,
    track: &mut Track,
    frame: &Frame,
    now: NaiveDateTime,
) -> LivenessVerdict {
    let ear = track.latest_ear();
    let bbox = *track.bbox();
    let track_age = track.age(now);
    engine.update(
        &mut track.liveness,
        LivenessInput {
            ear,
            frame,
            bbox: &bbox,
            track_age,
        },
    )
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
