use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};

use rollcall_core::attendance::domain::attendance_record::{AttendanceEvent, AttendanceRecord};
use rollcall_core::attendance::domain::attendance_store::AttendanceStore;
use rollcall_core::attendance::infrastructure::sqlite_store::SqliteAttendanceStore;
use rollcall_core::detection::domain::face_detector::FaceDetector;
use rollcall_core::detection::infrastructure::min_size_detector::MinSizeDetector;
use rollcall_core::detection::infrastructure::replay_detector::ReplayDetector;
use rollcall_core::liveness::infrastructure::texture_spoof_scorer::TextureSpoofScorer;
use rollcall_core::notification::domain::notifier::{Notifier, NullNotifier};
use rollcall_core::notification::infrastructure::log_notifier::LogNotifier;
use rollcall_core::pipeline::infrastructure::threaded_pipeline_executor::ThreadedPipelineExecutor;
use rollcall_core::pipeline::pipeline_executor::{ExecutorConfig, PipelineExecutor};
use rollcall_core::pipeline::pipeline_logger::{PipelineLogger, StdoutPipelineLogger};
use rollcall_core::pipeline::recognition_handle::FaceSample;
use rollcall_core::pipeline::recognition_pipeline::{FrameReport, RecognitionPipeline};
use rollcall_core::recognition::domain::encoding_cache::EncodingCache;
use rollcall_core::recognition::domain::gallery::Gallery;
use rollcall_core::recognition::infrastructure::json_encoding_cache::JsonEncodingCache;
use rollcall_core::shared::constants::SETTINGS_FILENAME;
use rollcall_core::shared::embedding::Embedding;
use rollcall_core::shared::settings::Settings;
use rollcall_core::video::infrastructure::image_sequence_source::{load_frame, ImageSequenceSource};

/// Face attendance with tracking, identity matching and liveness checks.
#[derive(Parser)]
#[command(name = "rollcall")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (defaults to settings.json in the data directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Match distance threshold.
    #[arg(long, global = true)]
    threshold: Option<f32>,

    /// Minimum face width and height in pixels.
    #[arg(long, global = true)]
    min_face_size: Option<f64>,

    /// Run detection every Nth frame (1 = every frame).
    #[arg(long, global = true)]
    skip_frames: Option<usize>,

    /// Treat every face as live.
    #[arg(long, global = true)]
    no_liveness: bool,

    /// Track and match faces without recording attendance.
    #[arg(long, global = true)]
    no_attendance: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Process an image sequence and record attendance.
    Run {
        /// Directory of frames, processed in file-name order.
        #[arg(long)]
        frames: PathBuf,

        /// Pre-computed detections: {"frames": {"<index>": [...]}}.
        #[arg(long)]
        detections: PathBuf,

        /// Capture time of the first frame (defaults to now).
        #[arg(long)]
        start: Option<NaiveDateTime>,
    },
    /// Add a face to the gallery.
    Register {
        #[arg(long)]
        name: String,

        /// JSON array holding the embedding.
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        embedding: Option<PathBuf>,

        /// Image to enroll; the largest face is used.
        #[arg(long, requires = "detections")]
        image: Option<PathBuf>,

        /// Detections for the image, stored under frame index 0.
        #[arg(long)]
        detections: Option<PathBuf>,
    },
    /// Show attendance for a day.
    Report {
        /// Day as YYYY-MM-DD (defaults to today).
        #[arg(long)]
        day: Option<NaiveDate>,

        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List enrolled identities.
    Gallery,
    /// Write the effective settings, overrides included, to the settings file.
    Init,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let settings_file = settings_path(&cli);

    match cli.command {
        Command::Run {
            frames,
            detections,
            start,
        } => run_session(&settings, &frames, &detections, start),
        Command::Register {
            name,
            embedding,
            image,
            detections,
        } => register(&settings, &name, embedding, image, detections),
        Command::Report { day, json } => report(&settings, day, json),
        Command::Gallery => list_gallery(&settings),
        Command::Init => write_settings(&settings, &settings_file),
    }
}

fn settings_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| Settings::default().paths.data_dir.join(SETTINGS_FILENAME))
}

fn load_settings(cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = Settings::load(&settings_path(cli))?;

    if let Some(threshold) = cli.threshold {
        settings.recognition.threshold = threshold;
    }
    if let Some(min_face_size) = cli.min_face_size {
        settings.recognition.min_face_size = min_face_size;
    }
    if let Some(skip_frames) = cli.skip_frames {
        settings.recognition.skip_frames = skip_frames;
    }
    if cli.no_liveness {
        settings.liveness.enabled = false;
    }
    if cli.no_attendance {
        settings.attendance.enabled = false;
    }
    settings.validate()?;
    Ok(settings)
}

fn run_session(
    settings: &Settings,
    frames: &Path,
    detections: &Path,
    start: Option<NaiveDateTime>,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = start.unwrap_or_else(|| Local::now().naive_local());
    let source = ImageSequenceSource::open(frames, start, settings.pipeline.fps)?;
    let replay = ReplayDetector::from_path(detections)?;
    let detectors: Vec<Box<dyn FaceDetector>> = (0..settings.pipeline.workers)
        .map(|_| {
            Box::new(MinSizeDetector::new(
                Box::new(replay.clone()),
                settings.recognition.min_face_size,
            )) as Box<dyn FaceDetector>
        })
        .collect();

    let mut pipeline = open_pipeline(settings)?;
    let mut config = ExecutorConfig::from_settings(settings);
    config.on_report = Some(Box::new(|report: &FrameReport| {
        for event in &report.events {
            print_event(event);
        }
    }));

    let mut logger = StdoutPipelineLogger::default();
    logger.info(&format!(
        "Gallery holds {} identities",
        pipeline.handle().gallery_identities().len()
    ));
    let summary = ThreadedPipelineExecutor::new().execute(
        Box::new(source),
        detectors,
        &mut pipeline,
        &mut logger,
        config,
    )?;

    let end = summary.last_timestamp.unwrap_or(start);
    for event in pipeline.end_session(end)? {
        print_event(&event);
    }
    logger.summary();
    log::info!(
        "{} frames captured, {} processed, {} dropped, {} failed, {} timeouts",
        summary.frames_captured,
        summary.frames_processed,
        summary.frames_dropped,
        summary.frames_failed,
        summary.timeouts
    );

    if settings.attendance.enabled {
        print_records(&pipeline.handle().attendance_for(end.date()));
    }
    Ok(())
}

fn register(
    settings: &Settings,
    name: &str,
    embedding: Option<PathBuf>,
    image: Option<PathBuf>,
    detections: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut pipeline = open_pipeline(settings)?;
    let sample = match (embedding, image, detections) {
        (Some(path), _, _) => {
            let values: Vec<f32> = serde_json::from_str(&fs::read_to_string(&path)?)?;
            FaceSample::Embedding(Embedding::new(values))
        }
        (None, Some(image), Some(detections)) => {
            let detector = ReplayDetector::from_path(&detections)?;
            pipeline = pipeline.with_enrollment_detector(Box::new(detector));
            FaceSample::Image(load_frame(&image, 0, Local::now().naive_local())?)
        }
        _ => return Err("either --embedding or --image with --detections is required".into()),
    };

    let version = pipeline.handle().register_face(name, sample)?;
    println!("Registered {name} (gallery version {version})");
    Ok(())
}

fn report(
    settings: &Settings,
    day: Option<NaiveDate>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let day = day.unwrap_or_else(|| Local::now().date_naive());
    let store = SqliteAttendanceStore::open(&settings.paths.database_path())?;
    let records = store.load_attendance(day)?;
    let detections = store.detection_count(day)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No attendance recorded for {day}");
    } else {
        print_records(&records);
    }
    println!("{detections} detection(s) recorded on {day}");
    Ok(())
}

fn write_settings(settings: &Settings, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    settings.save(path)?;
    println!("Wrote settings to {}", path.display());
    Ok(())
}

fn list_gallery(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let gallery = load_gallery(settings)?;
    let identities = gallery.identities();
    if identities.is_empty() {
        println!("Gallery is empty");
    }
    for (name, count) in identities {
        println!("{name:24} {count} embedding(s)");
    }
    Ok(())
}

/// Wires the core to the SQLite store, the JSON encoding cache, the
/// texture scorer and the log notifier.
fn open_pipeline(settings: &Settings) -> Result<RecognitionPipeline, Box<dyn std::error::Error>> {
    let store: Arc<dyn AttendanceStore> =
        Arc::new(SqliteAttendanceStore::open(&settings.paths.database_path())?);
    let cache: Arc<dyn EncodingCache> =
        Arc::new(JsonEncodingCache::new(settings.paths.encoding_cache_path()));
    let gallery = Arc::new(load_gallery(settings)?);
    let notifier: Arc<dyn Notifier> = if settings.notifications.enabled {
        Arc::new(LogNotifier::new(chrono::Duration::minutes(
            settings.notifications.cooldown_minutes as i64,
        )))
    } else {
        Arc::new(NullNotifier)
    };
    let scorer = TextureSpoofScorer::new(
        settings.liveness.texture_reference,
        settings.liveness.color_reference,
    );

    let pipeline = RecognitionPipeline::new(settings, gallery, store, notifier, Box::new(scorer))?
        .with_encoding_cache(cache);
    Ok(pipeline)
}

fn load_gallery(settings: &Settings) -> Result<Gallery, Box<dyn std::error::Error>> {
    let cache = JsonEncodingCache::new(settings.paths.encoding_cache_path());
    let entries = cache.load_gallery()?;
    Ok(Gallery::new(
        entries,
        settings.recognition.embedding_dim,
        settings.recognition.index_min_gallery_size,
    )?)
}

fn print_event(event: &AttendanceEvent) {
    match event {
        AttendanceEvent::CheckedIn { identity, at } => println!("{at}  {identity} checked in"),
        AttendanceEvent::CheckedOut {
            identity,
            at,
            reason,
        } => println!("{at}  {identity} checked out ({reason:?})"),
    }
}

fn print_records(records: &[AttendanceRecord]) {
    println!(
        "{:24} {:14} {:20} {:20} {:20}",
        "identity", "status", "check-in", "last seen", "check-out"
    );
    for r in records {
        println!(
            "{:24} {:14} {:20} {:20} {:20}",
            r.identity,
            r.status.as_str(),
            format_time(r.last_check_in),
            r.last_seen.format("%Y-%m-%d %H:%M:%S").to_string(),
            format_time(r.checked_out_at),
        );
    }
}

fn format_time(at: Option<NaiveDateTime>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
