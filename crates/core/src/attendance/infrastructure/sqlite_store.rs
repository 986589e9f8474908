use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection};

use crate::attendance::domain::attendance_record::{AttendanceRecord, AttendanceStatus};
use crate::attendance::domain::attendance_store::{AttendanceStore, DetectionRecord, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS detections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    track_id INTEGER NOT NULL,
    identity TEXT,
    distance REAL,
    liveness TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_detections_timestamp ON detections (timestamp);
CREATE TABLE IF NOT EXISTS attendance (
    identity TEXT NOT NULL,
    day TEXT NOT NULL,
    status TEXT NOT NULL,
    check_in TEXT,
    last_seen TEXT NOT NULL,
    check_out TEXT,
    PRIMARY KEY (identity, day)
);
";

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

/// SQLite-backed attendance store.
///
/// One connection guarded by a mutex; every call is a single statement,
/// so no explicit transactions are needed.
pub struct SqliteAttendanceStore {
    conn: Mutex<Connection>,
}

impl SqliteAttendanceStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot open {}: {e}", path.display()))
        })?;
        log::debug!("Opened attendance database at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Detections recorded during `day`.
    pub fn detection_count(&self, day: NaiveDate) -> Result<usize, StoreError> {
        let start = day.and_time(NaiveTime::MIN);
        let end = start + Duration::days(1);
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM detections WHERE timestamp >= ?1 AND timestamp < ?2",
            params![start, end],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl AttendanceStore for SqliteAttendanceStore {
    fn record_detection(&self, record: &DetectionRecord) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO detections (track_id, identity, distance, liveness, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.track_id as i64,
                record.identity.name(),
                record.distance.map(f64::from),
                record.liveness.as_str(),
                record.timestamp,
            ],
        )?;
        Ok(())
    }

    fn upsert_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO attendance (identity, day, status, check_in, last_seen, check_out)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (identity, day) DO UPDATE SET
                status = excluded.status,
                check_in = excluded.check_in,
                last_seen = excluded.last_seen,
                check_out = excluded.check_out",
            params![
                record.identity,
                record.day,
                record.status.as_str(),
                record.last_check_in,
                record.last_seen,
                record.checked_out_at,
            ],
        )?;
        Ok(())
    }

    fn load_attendance(&self, day: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        type Row = (
            String,
            NaiveDate,
            String,
            Option<NaiveDateTime>,
            NaiveDateTime,
            Option<NaiveDateTime>,
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT identity, day, status, check_in, last_seen, check_out
             FROM attendance WHERE day = ?1 ORDER BY identity",
        )?;
        let rows = stmt.query_map(params![day], |row| -> rusqlite::Result<Row> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (identity, day, status, last_check_in, last_seen, checked_out_at) = row?;
            let status = AttendanceStatus::parse(&status).ok_or_else(|| StoreError::Corrupt {
                field: "status",
                value: status.clone(),
            })?;
            records.push(AttendanceRecord {
                identity,
                day,
                status,
                last_check_in,
                last_seen,
                checked_out_at,
            });
        }
        Ok(records)
    }
}
