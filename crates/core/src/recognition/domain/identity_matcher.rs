use crate::recognition::domain::gallery::GallerySnapshot;
use crate::recognition::domain::identity::{Identity, MatchResult};
use crate::shared::embedding::Embedding;

/// Single-embedding gallery lookup.
///
/// The nearest identity is accepted only when its distance is strictly
/// below `threshold`; otherwise the result is `Unknown` and still carries
/// the nearest distance.
#[derive(Clone, Debug)]
pub struct IdentityMatcher {
    threshold: f32,
}

impl IdentityMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn match_embedding(&self, gallery: &GallerySnapshot, embedding: &Embedding) -> MatchResult {
        match gallery.nearest(embedding) {
            None => MatchResult::no_gallery(),
            Some((name, distance)) if distance < self.threshold => {
                MatchResult::new(Identity::known(name), distance)
            }
            Some((_, distance)) => MatchResult::new(Identity::Unknown, distance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::domain::gallery::{Gallery, GalleryEntry};
    use approx::assert_relative_eq;

    /// 128-d embedding that differs from `base` by `offset` in one component.
    fn emb_at(base: f32, offset: f32) -> Embedding {
        let mut v = vec![base; 128];
        v[0] += offset;
        Embedding::new(v)
    }

    fn alice_gallery() -> Gallery {
        Gallery::new(vec![GalleryEntry::new("alice", vec![emb_at(0.1, 0.0)])], 128, 256).unwrap()
    }

    #[test]
    fn test_close_query_matches_alice() {
        let gallery = alice_gallery();
        let matcher = IdentityMatcher::new(0.6);

        let result = matcher.match_embedding(&gallery.snapshot(), &emb_at(0.1, 0.3));

        assert_eq!(result.identity, Identity::known("alice"));
        assert_relative_eq!(result.distance, 0.3, epsilon = 1e-6);
    }

    #[test]
    fn test_distance_at_threshold_is_unknown() {
        let gallery = Gallery::new(
            vec![GalleryEntry::new("alice", vec![Embedding::new(vec![0.0, 0.0])])],
            2,
            256,
        )
        .unwrap();
        let matcher = IdentityMatcher::new(5.0);

        let result = matcher.match_embedding(&gallery.snapshot(), &Embedding::new(vec![3.0, 4.0]));

        assert_eq!(result.identity, Identity::Unknown);
        assert_eq!(result.distance, 5.0);
    }

    #[test]
    fn test_empty_gallery_is_unknown_at_infinity() {
        let gallery = Gallery::empty(128, 256);
        let result = IdentityMatcher::new(0.6).match_embedding(&gallery.snapshot(), &emb_at(0.1, 0.0));
        assert_eq!(result.identity, Identity::Unknown);
        assert!(result.distance.is_infinite());
    }

    #[test]
    fn test_matching_is_idempotent() {
        let gallery = alice_gallery();
        let snapshot = gallery.snapshot();
        let matcher = IdentityMatcher::new(0.6);
        let query = emb_at(0.1, 0.25);

        assert_eq!(
            matcher.match_embedding(&snapshot, &query),
            matcher.match_embedding(&snapshot, &query)
        );
    }

    #[test]
    fn test_indexed_and_brute_force_snapshots_agree() {
        let entries: Vec<GalleryEntry> = (0..40)
            .map(|i| {
                GalleryEntry::new(
                    format!("person{i}"),
                    vec![Embedding::new(vec![i as f32 * 0.37 % 5.0, i as f32 * 0.11])],
                )
            })
            .collect();
        let brute = Gallery::new(entries.clone(), 2, usize::MAX).unwrap();
        let indexed = Gallery::new(entries, 2, 4).unwrap();
        assert!(indexed.snapshot().is_indexed());
        let matcher = IdentityMatcher::new(0.6);

        for q in 0..50 {
            let query = Embedding::new(vec![q as f32 * 0.093, q as f32 * 0.087]);
            assert_eq!(
                matcher.match_embedding(&brute.snapshot(), &query),
                matcher.match_embedding(&indexed.snapshot(), &query)
            );
        }
    }
}
