use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{Duration, NaiveDateTime};

use crate::notification::domain::notifier::{AlertEvent, Notifier};

/// Writes alerts to the log at warn level, at most once per event key
/// per cooldown.
pub struct LogNotifier {
    cooldown: Duration,
    last_sent: Mutex<HashMap<String, NaiveDateTime>>,
}

impl LogNotifier {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Records `event` as sent unless its key is still cooling down.
    fn should_send(&self, event: &AlertEvent) -> bool {
        let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
        let now = event.at();
        last_sent.retain(|_, sent| now - *sent < self.cooldown);

        let key = event.key();
        if let Some(last) = last_sent.get(&key) {
            if now - *last < self.cooldown {
                return false;
            }
        }
        last_sent.insert(key, now);
        true
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, event: &AlertEvent) {
        if !self.should_send(event) {
            log::debug!("Suppressed alert {} (cooldown)", event.key());
            return;
        }
        match event {
            AlertEvent::UnknownFace { track_id, at } => {
                log::warn!("Unknown face on track {track_id} at {at}");
            }
            AlertEvent::SpoofSuspected {
                track_id,
                identity,
                score,
                at,
            } => {
                log::warn!(
                    "Possible spoof on track {track_id} ({}) at {at}, score {score:.2}",
                    identity.as_deref().unwrap_or("unknown")
                );
            }
        }
    }
}
