use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;

use crate::attendance::domain::attendance_record::AttendanceRecord;
use crate::liveness::domain::liveness_verdict::LivenessVerdict;
use crate::recognition::domain::identity::Identity;
use crate::tracking::domain::track::TrackId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("attendance store unavailable: {0}")]
    Unavailable(String),
    #[error("attendance store query failed: {0}")]
    Query(String),
    #[error("attendance store holds invalid {field}: {value}")]
    Corrupt { field: &'static str, value: String },
}

/// One processed face, written for audit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub track_id: TrackId,
    pub identity: Identity,
    /// Nearest gallery distance; absent when the gallery was empty.
    pub distance: Option<f32>,
    pub liveness: LivenessVerdict,
    pub timestamp: NaiveDateTime,
}

/// Relational persistence used by the core.
pub trait AttendanceStore: Send + Sync {
    fn record_detection(&self, record: &DetectionRecord) -> Result<(), StoreError>;

    /// Inserts or replaces the record for `(identity, day)`.
    fn upsert_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError>;

    /// Every record of `day`, ordered by identity.
    fn load_attendance(&self, day: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError>;
}
