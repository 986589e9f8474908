use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    #[default]
    NotCheckedIn,
    CheckedIn,
    CheckedOut,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotCheckedIn => "not_checked_in",
            Self::CheckedIn => "checked_in",
            Self::CheckedOut => "checked_out",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_checked_in" => Some(Self::NotCheckedIn),
            "checked_in" => Some(Self::CheckedIn),
            "checked_out" => Some(Self::CheckedOut),
            _ => None,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attendance of one identity on one calendar day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub identity: String,
    pub day: NaiveDate,
    pub status: AttendanceStatus,
    pub last_check_in: Option<NaiveDateTime>,
    pub last_seen: NaiveDateTime,
    pub checked_out_at: Option<NaiveDateTime>,
}

impl AttendanceRecord {
    pub fn checked_in(identity: &str, at: NaiveDateTime) -> Self {
        Self {
            identity: identity.to_string(),
            day: at.date(),
            status: AttendanceStatus::CheckedIn,
            last_check_in: Some(at),
            last_seen: at,
            checked_out_at: None,
        }
    }

    pub fn is_checked_in(&self) -> bool {
        self.status == AttendanceStatus::CheckedIn
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutReason {
    Absent,
    SessionEnded,
}

/// A state transition emitted by the attendance machine.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AttendanceEvent {
    CheckedIn {
        identity: String,
        at: NaiveDateTime,
    },
    CheckedOut {
        identity: String,
        at: NaiveDateTime,
        reason: CheckOutReason,
    },
}

impl AttendanceEvent {
    pub fn identity(&self) -> &str {
        match self {
            Self::CheckedIn { identity, .. } | Self::CheckedOut { identity, .. } => identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::frame::test_support::at;

    #[test]
    fn test_checked_in_record() {
        let record = AttendanceRecord::checked_in("bob", at(9, 0, 0));
        assert_eq!(record.day, at(9, 0, 0).date());
        assert_eq!(record.status, AttendanceStatus::CheckedIn);
        assert_eq!(record.last_check_in, Some(at(9, 0, 0)));
        assert!(record.checked_out_at.is_none());
    }

    #[test]
    fn test_status_parse() {
        for status in [
            AttendanceStatus::NotCheckedIn,
            AttendanceStatus::CheckedIn,
            AttendanceStatus::CheckedOut,
        ] {
            assert_eq!(AttendanceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AttendanceStatus::parse("present"), None);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = AttendanceEvent::CheckedIn {
            identity: "bob".into(),
            at: at(9, 0, 0),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "checked_in");
        assert_eq!(event.identity(), "bob");
    }
}
