use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::attendance::domain::attendance_record::{
    AttendanceEvent, AttendanceRecord, AttendanceStatus, CheckOutReason,
};
use crate::attendance::domain::attendance_store::{AttendanceStore, StoreError};
use crate::shared::settings::AttendanceSettings;

#[derive(Clone, Debug, PartialEq)]
pub struct AttendanceConfig {
    /// Verified sightings closer than this to the last accepted one are ignored.
    pub cooldown: Duration,
    /// Unseen for longer than this and a checked-in identity is checked out.
    pub absence_gap: Duration,
    pub min_confidence: f32,
}

impl From<&AttendanceSettings> for AttendanceConfig {
    fn from(s: &AttendanceSettings) -> Self {
        Self {
            cooldown: s.cooldown(),
            absence_gap: s.absence_gap(),
            min_confidence: s.min_confidence,
        }
    }
}

type RecordKey = (String, NaiveDate);

/// Per-(identity, day) check-in/check-out state.
///
/// Every transition is written through the store before it takes effect
/// in memory, so a failed write leaves the machine unchanged and the
/// next sighting retries.
pub struct AttendanceMachine {
    config: AttendanceConfig,
    store: Arc<dyn AttendanceStore>,
    records: HashMap<RecordKey, AttendanceRecord>,
    /// Last accepted sighting per identity and day; the cooldown never
    /// spans midnight.
    last_accepted: HashMap<RecordKey, NaiveDateTime>,
}

impl AttendanceMachine {
    pub fn new(config: AttendanceConfig, store: Arc<dyn AttendanceStore>) -> Self {
        Self {
            config,
            store,
            records: HashMap::new(),
            last_accepted: HashMap::new(),
        }
    }

    /// Loads `day`'s records from the store so a restart cannot check
    /// anyone in twice.
    pub fn seed(&mut self, day: NaiveDate) -> Result<usize, StoreError> {
        let records = self.store.load_attendance(day)?;
        let count = records.len();
        for record in records {
            let key = (record.identity.clone(), record.day);
            let accepted = self.last_accepted.entry(key.clone()).or_insert(record.last_seen);
            *accepted = (*accepted).max(record.last_seen);
            self.records.insert(key, record);
        }
        log::debug!("Seeded {count} attendance records for {day}");
        Ok(count)
    }

    /// A track carrying `identity` reached LIVE with `confidence`.
    pub fn on_verified(
        &mut self,
        identity: &str,
        confidence: f32,
        now: NaiveDateTime,
    ) -> Result<Option<AttendanceEvent>, StoreError> {
        if confidence < self.config.min_confidence {
            return Ok(None);
        }
        let key = (identity.to_string(), now.date());
        if let Some(last) = self.last_accepted.get(&key) {
            if now - *last < self.config.cooldown {
                return Ok(None);
            }
        }

        let (record, event) = match self.records.get(&key) {
            None => (
                AttendanceRecord::checked_in(identity, now),
                Some(AttendanceEvent::CheckedIn {
                    identity: identity.to_string(),
                    at: now,
                }),
            ),
            Some(existing) => {
                let mut refreshed = existing.clone();
                refreshed.last_seen = refreshed.last_seen.max(now);
                (refreshed, None)
            }
        };

        self.store.upsert_attendance(&record)?;
        if event.is_some() {
            log::info!("{identity} checked in at {now}");
        }
        self.last_accepted.insert(key.clone(), now);
        self.records.insert(key, record);
        Ok(event)
    }

    /// Any non-spoof track carrying `identity` keeps a checked-in record
    /// from timing out.
    pub fn mark_seen(&mut self, identity: &str, now: NaiveDateTime) {
        if let Some(record) = self.records.get_mut(&(identity.to_string(), now.date())) {
            if record.is_checked_in() && now > record.last_seen {
                record.last_seen = now;
            }
        }
    }

    /// Checks out every identity unseen for longer than the absence gap.
    /// The check-out time is when they were last seen.
    pub fn sweep_absences(&mut self, now: NaiveDateTime) -> Result<Vec<AttendanceEvent>, StoreError> {
        let gap = self.config.absence_gap;
        let absent: Vec<RecordKey> = self.sorted_keys(|r| r.is_checked_in() && now - r.last_seen > gap);
        let mut events = Vec::new();
        for key in absent {
            let at = self.records[&key].last_seen;
            events.push(self.check_out(key, at, CheckOutReason::Absent)?);
        }
        Ok(events)
    }

    /// Checks out everyone still checked in.
    pub fn end_session(&mut self, now: NaiveDateTime) -> Result<Vec<AttendanceEvent>, StoreError> {
        let present = self.sorted_keys(AttendanceRecord::is_checked_in);
        let mut events = Vec::new();
        for key in present {
            events.push(self.check_out(key, now, CheckOutReason::SessionEnded)?);
        }
        Ok(events)
    }

    fn check_out(
        &mut self,
        key: RecordKey,
        at: NaiveDateTime,
        reason: CheckOutReason,
    ) -> Result<AttendanceEvent, StoreError> {
        let Some(existing) = self.records.get(&key) else {
            return Err(StoreError::Query(format!("no attendance record for {}", key.0)));
        };
        let mut record = existing.clone();
        record.status = AttendanceStatus::CheckedOut;
        record.checked_out_at = Some(at);
        self.store.upsert_attendance(&record)?;
        log::info!("{} checked out at {at} ({reason:?})", record.identity);
        self.records.insert(key.clone(), record);
        Ok(AttendanceEvent::CheckedOut {
            identity: key.0,
            at,
            reason,
        })
    }

    fn sorted_keys(&self, filter: impl Fn(&AttendanceRecord) -> bool) -> Vec<RecordKey> {
        let mut keys: Vec<RecordKey> = self
            .records
            .iter()
            .filter(|(_, r)| filter(r))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Copies of `day`'s records, ordered by identity.
    pub fn attendance_for(&self, day: NaiveDate) -> Vec<AttendanceRecord> {
        let mut records: Vec<AttendanceRecord> = self
            .records
            .values()
            .filter(|r| r.day == day)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::domain::attendance_store::test_support::MemoryStore;
    use crate::shared::frame::test_support::at;

    fn config() -> AttendanceConfig {
        AttendanceConfig {
            cooldown: Duration::minutes(30),
            absence_gap: Duration::minutes(60),
            min_confidence: 0.2,
        }
    }

    fn machine() -> (AttendanceMachine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (AttendanceMachine::new(config(), store.clone()), store)
    }

    #[test]
    fn test_two_sightings_within_cooldown_check_in_once() {
        let (mut machine, store) = machine();

        let first = machine.on_verified("bob", 0.8, at(9, 0, 0)).unwrap();
        let second = machine.on_verified("bob", 0.8, at(9, 5, 0)).unwrap();

        assert!(matches!(first, Some(AttendanceEvent::CheckedIn { .. })));
        assert_eq!(second, None);
        assert_eq!(store.upserts.lock().unwrap().len(), 1);
        let records = machine.attendance_for(at(9, 0, 0).date());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].last_check_in, Some(at(9, 0, 0)));
    }

    #[test]
    fn test_sighting_after_cooldown_only_refreshes() {
        let (mut machine, store) = machine();
        machine.on_verified("bob", 0.8, at(9, 0, 0)).unwrap();

        let later = machine.on_verified("bob", 0.8, at(9, 31, 0)).unwrap();

        assert_eq!(later, None);
        let record = &machine.attendance_for(at(9, 0, 0).date())[0];
        assert_eq!(record.status, AttendanceStatus::CheckedIn);
        assert_eq!(record.last_check_in, Some(at(9, 0, 0)));
        assert_eq!(record.last_seen, at(9, 31, 0));
        assert_eq!(store.upserts.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_low_confidence_is_ignored() {
        let (mut machine, store) = machine();
        assert_eq!(machine.on_verified("bob", 0.1, at(9, 0, 0)).unwrap(), None);
        assert!(store.upserts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_absence_checks_out_at_last_seen() {
        let (mut machine, _) = machine();
        machine.on_verified("bob", 0.8, at(9, 0, 0)).unwrap();
        machine.mark_seen("bob", at(9, 20, 0));

        assert!(machine.sweep_absences(at(10, 20, 0)).unwrap().is_empty());
        let events = machine.sweep_absences(at(10, 20, 1)).unwrap();

        assert_eq!(
            events,
            vec![AttendanceEvent::CheckedOut {
                identity: "bob".into(),
                at: at(9, 20, 0),
                reason: CheckOutReason::Absent,
            }]
        );
        let record = &machine.attendance_for(at(9, 0, 0).date())[0];
        assert_eq!(record.status, AttendanceStatus::CheckedOut);
        assert_eq!(record.checked_out_at, Some(at(9, 20, 0)));
    }

    #[test]
    fn test_checked_out_identity_is_not_checked_in_again_same_day() {
        let (mut machine, _) = machine();
        machine.on_verified("bob", 0.8, at(9, 0, 0)).unwrap();
        machine.sweep_absences(at(11, 0, 0)).unwrap();

        let event = machine.on_verified("bob", 0.8, at(12, 0, 0)).unwrap();

        assert_eq!(event, None);
        let record = &machine.attendance_for(at(9, 0, 0).date())[0];
        assert_eq!(record.status, AttendanceStatus::CheckedOut);
        assert_eq!(record.last_seen, at(12, 0, 0));
    }

    #[test]
    fn test_mark_seen_without_record_is_noop() {
        let (mut machine, _) = machine();
        machine.mark_seen("nobody", at(9, 0, 0));
        assert!(machine.attendance_for(at(9, 0, 0).date()).is_empty());
    }

    #[test]
    fn test_end_session_checks_everyone_out() {
        let (mut machine, _) = machine();
        machine.on_verified("bob", 0.8, at(9, 0, 0)).unwrap();
        machine.on_verified("alice", 0.8, at(9, 1, 0)).unwrap();

        let events = machine.end_session(at(17, 0, 0)).unwrap();

        let names: Vec<&str> = events.iter().map(AttendanceEvent::identity).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert!(machine
            .attendance_for(at(9, 0, 0).date())
            .iter()
            .all(|r| r.checked_out_at == Some(at(17, 0, 0))));
    }

    #[test]
    fn test_persistence_failure_is_surfaced_and_retried() {
        let (mut machine, store) = machine();
        store.fail(true);

        let result = machine.on_verified("bob", 0.8, at(9, 0, 0));

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(machine.attendance_for(at(9, 0, 0).date()).is_empty());

        store.fail(false);
        let retry = machine.on_verified("bob", 0.8, at(9, 0, 1)).unwrap();
        assert!(matches!(retry, Some(AttendanceEvent::CheckedIn { .. })));
    }

    #[test]
    fn test_seeded_machine_does_not_check_in_twice() {
        let store = Arc::new(MemoryStore::default());
        store
            .upserts
            .lock()
            .unwrap()
            .push(AttendanceRecord::checked_in("bob", at(8, 0, 0)));
        let mut machine = AttendanceMachine::new(config(), store.clone());

        assert_eq!(machine.seed(at(8, 0, 0).date()).unwrap(), 1);
        let event = machine.on_verified("bob", 0.8, at(9, 0, 0)).unwrap();

        assert_eq!(event, None);
        assert_eq!(machine.attendance_for(at(8, 0, 0).date())[0].last_check_in, Some(at(8, 0, 0)));
    }

    #[test]
    fn test_new_day_gets_new_record() {
        let (mut machine, _) = machine();
        machine.on_verified("bob", 0.8, at(9, 0, 0)).unwrap();
        let tomorrow = at(9, 0, 0) + Duration::days(1);

        let event = machine.on_verified("bob", 0.8, tomorrow).unwrap();

        assert!(matches!(event, Some(AttendanceEvent::CheckedIn { .. })));
        assert_eq!(machine.attendance_for(tomorrow.date()).len(), 1);
    }

    #[test]
    fn test_cooldown_does_not_carry_over_midnight() {
        let (mut machine, _) = machine();
        machine.on_verified("bob", 0.8, at(23, 50, 0)).unwrap();
        let after_midnight = at(0, 10, 0) + Duration::days(1);

        let event = machine.on_verified("bob", 0.8, after_midnight).unwrap();

        assert_eq!(
            event,
            Some(AttendanceEvent::CheckedIn {
                identity: "bob".into(),
                at: after_midnight,
            })
        );
        assert_eq!(machine.attendance_for(after_midnight.date()).len(), 1);
        assert_eq!(machine.attendance_for(at(23, 50, 0).date()).len(), 1);
    }
}
