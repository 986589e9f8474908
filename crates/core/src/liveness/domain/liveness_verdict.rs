use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessVerdict {
    #[default]
    Pending,
    Live,
    SpoofSuspected,
}

impl LivenessVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Live => "live",
            Self::SpoofSuspected => "spoof_suspected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "live" => Some(Self::Live),
            "spoof_suspected" => Some(Self::SpoofSuspected),
            _ => None,
        }
    }
}

impl fmt::Display for LivenessVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(LivenessVerdict::Pending)]
    #[case(LivenessVerdict::Live)]
    #[case(LivenessVerdict::SpoofSuspected)]
    fn test_parse_inverts_as_str(#[case] verdict: LivenessVerdict) {
        assert_eq!(LivenessVerdict::parse(verdict.as_str()), Some(verdict));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(LivenessVerdict::parse("alive"), None);
    }
}
