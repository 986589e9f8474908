use std::fmt;

use serde::{Deserialize, Serialize};

/// Who a face belongs to, as far as the gallery can tell.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    Known(String),
    #[default]
    Unknown,
}

impl Identity {
    pub fn known(name: impl Into<String>) -> Self {
        Self::Known(name.into())
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Known(name) => Some(name),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(name) => f.write_str(name),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Outcome of one gallery lookup.
///
/// `distance` is the nearest gallery distance even when the result is
/// `Unknown`; it is `+inf` when the gallery was empty.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchResult {
    pub identity: Identity,
    pub distance: f32,
}

impl MatchResult {
    pub fn new(identity: Identity, distance: f32) -> Self {
        Self { identity, distance }
    }

    pub fn no_gallery() -> Self {
        Self::new(Identity::Unknown, f32::INFINITY)
    }

    /// `1 - distance / threshold`, clamped to `[0, 1]`; 0 for `Unknown`.
    pub fn confidence(&self, threshold: f32) -> f32 {
        if self.identity.is_known() {
            confidence_for(self.distance, threshold)
        } else {
            0.0
        }
    }
}

pub fn confidence_for(distance: f32, threshold: f32) -> f32 {
    if !distance.is_finite() || threshold <= 0.0 {
        return 0.0;
    }
    (1.0 - distance / threshold).clamp(0.0, 1.0)
}
