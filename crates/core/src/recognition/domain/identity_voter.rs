use std::collections::HashMap;

use crate::recognition::domain::identity::{confidence_for, Identity, MatchResult};

/// A label that won the vote, with its confidence.
#[derive(Clone, Debug, PartialEq)]
pub struct VoteOutcome {
    pub identity: Identity,
    pub confidence: f32,
}

/// Majority vote over the match results of a track's buffered embeddings.
///
/// A label wins only with a strict majority of the results present. No
/// outcome means the caller keeps the identity it already reports.
#[derive(Clone, Debug)]
pub struct IdentityVoter {
    threshold: f32,
}

impl IdentityVoter {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn vote(&self, results: &[MatchResult]) -> Option<VoteOutcome> {
        let mut tally: HashMap<&Identity, (usize, f32)> = HashMap::new();
        for result in results {
            let entry = tally.entry(&result.identity).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += result.distance;
        }

        let (identity, (count, distance_sum)) = tally
            .into_iter()
            .find(|(_, (count, _))| count * 2 > results.len())?;

        let confidence = match identity {
            Identity::Known(_) => confidence_for(distance_sum / count as f32, self.threshold),
            Identity::Unknown => 0.0,
        };
        Some(VoteOutcome {
            identity: identity.clone(),
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn known(name: &str, distance: f32) -> MatchResult {
        MatchResult::new(Identity::known(name), distance)
    }

    fn unknown() -> MatchResult {
        MatchResult::new(Identity::Unknown, 0.9)
    }

    #[test]
    fn test_strict_majority_wins() {
        let voter = IdentityVoter::new(0.6);
        let outcome = voter
            .vote(&[known("alice", 0.2), known("alice", 0.4), unknown()])
            .unwrap();
        assert_eq!(outcome.identity, Identity::known("alice"));
        // mean winning distance 0.3 -> 1 - 0.3 / 0.6
        assert_relative_eq!(outcome.confidence, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_even_split_has_no_winner() {
        let voter = IdentityVoter::new(0.6);
        assert!(voter
            .vote(&[known("alice", 0.2), known("bob", 0.2)])
            .is_none());
        assert!(voter
            .vote(&[known("alice", 0.2), known("alice", 0.2), unknown(), unknown()])
            .is_none());
    }

    #[test]
    fn test_plurality_is_not_enough() {
        let voter = IdentityVoter::new(0.6);
        let results = [known("alice", 0.2), known("alice", 0.2), known("bob", 0.1), unknown(), unknown()];
        assert!(voter.vote(&results).is_none());
    }

    #[test]
    fn test_unknown_majority_reports_zero_confidence() {
        let voter = IdentityVoter::new(0.6);
        let outcome = voter.vote(&[unknown(), unknown(), known("alice", 0.1)]).unwrap();
        assert_eq!(outcome.identity, Identity::Unknown);
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_single_result_decides() {
        let outcome = IdentityVoter::new(0.6).vote(&[known("bob", 0.0)]).unwrap();
        assert_eq!(outcome.identity, Identity::known("bob"));
        assert_eq!(outcome.confidence, 1.0);
    }

    #[test]
    fn test_no_results_no_outcome() {
        assert!(IdentityVoter::new(0.6).vote(&[]).is_none());
    }
}
