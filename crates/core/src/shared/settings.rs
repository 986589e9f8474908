use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    DATABASE_FILENAME, DEFAULT_EMBEDDING_DIM, DEFAULT_MATCH_THRESHOLD, EAR_WINDOW,
    ENCODING_CACHE_FILENAME, INDEX_MIN_GALLERY_SIZE, SMOOTHING_WINDOW,
    TRACKER_MAX_ASSOCIATION_DISTANCE, TRACKER_MAX_MISSED,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Euclidean distance cutoff for a gallery match.
    pub threshold: f32,
    /// Detector variant; opaque to the core and passed through to adapters.
    pub model: String,
    /// Process every Nth captured frame (1 = every frame).
    pub skip_frames: usize,
    /// Minimum face width and height in pixels.
    pub min_face_size: f64,
    pub embedding_dim: usize,
    /// Embeddings kept per track for identity voting.
    pub smoothing_window: usize,
    pub index_min_gallery_size: usize,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            model: "hog".to_string(),
            skip_frames: 2,
            min_face_size: 50.0,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            smoothing_window: SMOOTHING_WINDOW,
            index_min_gallery_size: INDEX_MIN_GALLERY_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub max_missed_frames: usize,
    pub max_association_distance: f64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            max_missed_frames: TRACKER_MAX_MISSED,
            max_association_distance: TRACKER_MAX_ASSOCIATION_DISTANCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessSettings {
    pub enabled: bool,
    pub blink_threshold: f64,
    pub min_consecutive_frames: usize,
    /// Longest eye closure, in frames, still counted as a blink.
    pub max_blink_frames: usize,
    pub ear_window: usize,
    /// Seconds a track may live without blinking before it is suspected.
    pub liveness_window_secs: f64,
    pub spoof_threshold: f64,
    /// Run texture analysis every N updates of a track.
    pub spoof_check_interval: usize,
    /// Gradient-magnitude variance at which a crop counts as fully textured.
    pub texture_reference: f64,
    /// Cr + Cb standard deviation at which a crop counts as fully coloured.
    pub color_reference: f64,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            blink_threshold: 0.25,
            min_consecutive_frames: 2,
            max_blink_frames: 10,
            ear_window: EAR_WINDOW,
            liveness_window_secs: 10.0,
            spoof_threshold: 0.8,
            spoof_check_interval: 5,
            texture_reference: 80.0,
            color_reference: 15.0,
        }
    }
}

impl LivenessSettings {
    pub fn liveness_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds((self.liveness_window_secs * 1000.0) as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceSettings {
    pub enabled: bool,
    pub cooldown_minutes: u64,
    /// Minutes without a sighting before a checked-in identity is checked out.
    pub absence_minutes: u64,
    /// Matcher confidence floor for a sighting to count.
    pub min_confidence: f32,
}

impl Default for AttendanceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_minutes: 30,
            absence_minutes: 60,
            min_confidence: 0.2,
        }
    }
}

impl AttendanceSettings {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cooldown_minutes as i64)
    }

    pub fn absence_gap(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.absence_minutes as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Detection worker threads.
    pub workers: usize,
    /// Frames queued for detection before the oldest is dropped.
    pub max_in_flight: usize,
    pub frame_timeout_ms: u64,
    /// Capture rate used to timestamp image sequences.
    pub fps: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            max_in_flight: 2,
            frame_timeout_ms: 2000,
            fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub cooldown_minutes: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub data_dir: PathBuf,
    pub database: Option<PathBuf>,
    pub encoding_cache: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: None,
            encoding_cache: None,
        }
    }
}

impl PathSettings {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DATABASE_FILENAME))
    }

    pub fn encoding_cache_path(&self) -> PathBuf {
        self.encoding_cache
            .clone()
            .unwrap_or_else(|| self.data_dir.join(ENCODING_CACHE_FILENAME))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("data"))
        .join("rollcall")
}

/// Every option the core consumes, grouped by component.
///
/// Missing sections and keys fall back to their defaults, so a settings
/// file only needs to name what it overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub recognition: RecognitionSettings,
    pub tracker: TrackerSettings,
    pub liveness: LivenessSettings,
    pub attendance: AttendanceSettings,
    pub pipeline: PipelineSettings,
    pub notifications: NotificationSettings,
    pub paths: PathSettings,
}

impl Settings {
    /// Loads settings from `path`, or defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.recognition;
        if !(r.threshold > 0.0 && r.threshold.is_finite()) {
            return Err(invalid("recognition.threshold", "must be a positive number"));
        }
        if r.skip_frames < 1 {
            return Err(invalid("recognition.skip_frames", "must be >= 1"));
        }
        if r.min_face_size < 0.0 {
            return Err(invalid("recognition.min_face_size", "must not be negative"));
        }
        if r.embedding_dim == 0 {
            return Err(invalid("recognition.embedding_dim", "must be >= 1"));
        }
        if r.smoothing_window == 0 {
            return Err(invalid("recognition.smoothing_window", "must be >= 1"));
        }
        if self.tracker.max_association_distance <= 0.0 {
            return Err(invalid("tracker.max_association_distance", "must be positive"));
        }
        let l = &self.liveness;
        if l.min_consecutive_frames == 0 {
            return Err(invalid("liveness.min_consecutive_frames", "must be >= 1"));
        }
        if l.max_blink_frames < l.min_consecutive_frames {
            return Err(invalid(
                "liveness.max_blink_frames",
                "must be >= min_consecutive_frames",
            ));
        }
        if l.ear_window == 0 || l.spoof_check_interval == 0 {
            return Err(invalid(
                "liveness.ear_window",
                "ear_window and spoof_check_interval must be >= 1",
            ));
        }
        if !(0.0..=1.0).contains(&l.spoof_threshold) {
            return Err(invalid("liveness.spoof_threshold", "must be between 0.0 and 1.0"));
        }
        if l.liveness_window_secs <= 0.0 {
            return Err(invalid("liveness.liveness_window_secs", "must be positive"));
        }
        if l.texture_reference <= 0.0 || l.color_reference <= 0.0 {
            return Err(invalid(
                "liveness.texture_reference",
                "texture and color references must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.attendance.min_confidence) {
            return Err(invalid("attendance.min_confidence", "must be between 0.0 and 1.0"));
        }
        let p = &self.pipeline;
        if p.workers == 0 || p.max_in_flight == 0 {
            return Err(invalid(
                "pipeline.workers",
                "workers and max_in_flight must be >= 1",
            ));
        }
        if p.fps <= 0.0 {
            return Err(invalid("pipeline.fps", "must be positive"));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let s = Settings::default();
        assert_relative_eq!(s.recognition.threshold, 0.6);
        assert_eq!(s.recognition.skip_frames, 2);
        assert_eq!(s.tracker.max_missed_frames, 15);
        assert_relative_eq!(s.tracker.max_association_distance, 75.0);
        assert_relative_eq!(s.liveness.blink_threshold, 0.25);
        assert_eq!(s.attendance.cooldown_minutes, 30);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let s = Settings::load(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"recognition": {"threshold": 0.5}, "tracker": {"max_missed_frames": 3}}"#,
        )
        .unwrap();

        let s = Settings::load(&path).unwrap();
        assert_relative_eq!(s.recognition.threshold, 0.5);
        assert_eq!(s.recognition.skip_frames, 2);
        assert_eq!(s.tracker.max_missed_frames, 3);
        assert_eq!(s.liveness, LivenessSettings::default());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_out_of_range_value_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"liveness": {"spoof_threshold": 1.5}}"#).unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::Invalid { key: "liveness.spoof_threshold", .. })
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut s = Settings::default();
        s.attendance.cooldown_minutes = 10;
        s.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), s);
    }

    #[test]
    fn test_paths_default_under_data_dir() {
        let paths = PathSettings {
            data_dir: PathBuf::from("/tmp/rc"),
            database: None,
            encoding_cache: Some(PathBuf::from("/elsewhere/enc.json")),
        };
        assert_eq!(paths.database_path(), PathBuf::from("/tmp/rc/rollcall.db"));
        assert_eq!(paths.encoding_cache_path(), PathBuf::from("/elsewhere/enc.json"));
    }

    #[test]
    fn test_duration_helpers() {
        let s = Settings::default();
        assert_eq!(s.attendance.cooldown(), chrono::Duration::minutes(30));
        assert_eq!(s.liveness.liveness_window(), chrono::Duration::seconds(10));
    }
}
