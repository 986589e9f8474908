use chrono::NaiveDateTime;

use crate::tracking::domain::track::TrackId;

/// Something an operator should hear about.
#[derive(Clone, Debug, PartialEq)]
pub enum AlertEvent {
    UnknownFace {
        track_id: TrackId,
        at: NaiveDateTime,
    },
    SpoofSuspected {
        track_id: TrackId,
        identity: Option<String>,
        score: f64,
        at: NaiveDateTime,
    },
}

impl AlertEvent {
    /// Alerts sharing a key are rate limited together.
    pub fn key(&self) -> String {
        match self {
            Self::UnknownFace { .. } => "unknown_face".to_string(),
            Self::SpoofSuspected { identity, .. } => match identity {
                Some(name) => format!("spoof:{name}"),
                None => "spoof:unknown".to_string(),
            },
        }
    }

    pub fn at(&self) -> NaiveDateTime {
        match self {
            Self::UnknownFace { at, .. } | Self::SpoofSuspected { at, .. } => *at,
        }
    }
}

/// Delivers alerts. Delivery failures are the notifier's own business;
/// the frame loop never fails because of them.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &AlertEvent);
}

/// Discards every alert.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: &AlertEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::frame::test_support::at;

    #[test]
    fn test_keys_group_by_kind_and_identity() {
        let unknown = AlertEvent::UnknownFace {
            track_id: 1,
            at: at(9, 0, 0),
        };
        let spoof = |identity: Option<&str>| AlertEvent::SpoofSuspected {
            track_id: 2,
            identity: identity.map(str::to_string),
            score: 0.9,
            at: at(9, 0, 0),
        };
        assert_eq!(unknown.key(), "unknown_face");
        assert_eq!(spoof(Some("bob")).key(), "spoof:bob");
        assert_eq!(spoof(None).key(), "spoof:unknown");
        assert_eq!(unknown.at(), at(9, 0, 0));
    }
}
