//! Nearest-identity matching over labelled reference descriptors.

use crate::types::{Descriptor, KnownIdentity, UNKNOWN_LABEL};

/// Default maximum descriptor distance accepted as a match.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.5;

/// Result of matching a query descriptor against the known identities.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Label of the matched identity, `None` when nothing was close enough.
    pub label: Option<String>,
    /// Distance to the nearest identity (infinite for an empty gallery).
    pub distance: f32,
}

impl MatchResult {
    pub fn matched(&self) -> bool {
        self.label.is_some()
    }

    /// Label to show for this result: the identity or `"Unknown"`.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(UNKNOWN_LABEL)
    }
}

/// Strategy for comparing a query descriptor against a gallery of identities.
pub trait Matcher {
    fn compare(&self, query: &Descriptor, gallery: &[KnownIdentity], threshold: f32) -> MatchResult;
}

/// Euclidean matcher: an identity's distance is the mean distance from the
/// query to each of its reference descriptors. A match requires the nearest
/// identity to be strictly closer than the threshold.
pub struct EuclideanMatcher;

impl EuclideanMatcher {
    fn identity_distance(query: &Descriptor, identity: &KnownIdentity) -> f32 {
        if identity.descriptors.is_empty() {
            return f32::INFINITY;
        }
        identity
            .descriptors
            .iter()
            .map(|d| query.euclidean_distance(d))
            .sum::<f32>()
            / identity.descriptors.len() as f32
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, query: &Descriptor, gallery: &[KnownIdentity], threshold: f32) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, identity) in gallery.iter().enumerate() {
            let dist = Self::identity_distance(query, identity);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist < threshold => MatchResult {
                label: Some(gallery[idx].label.clone()),
                distance: best_dist,
            },
            _ => MatchResult {
                label: None,
                distance: best_dist,
            },
        }
    }
}

/// The session's identity matcher: known identities plus a fixed threshold.
pub struct IdentityMatcher<M: Matcher = EuclideanMatcher> {
    gallery: Vec<KnownIdentity>,
    threshold: f32,
    matcher: M,
}

impl IdentityMatcher<EuclideanMatcher> {
    pub fn new(gallery: Vec<KnownIdentity>, threshold: f32) -> Self {
        Self::with_matcher(gallery, threshold, EuclideanMatcher)
    }

    /// A matcher with no known identities; every query resolves to `"Unknown"`.
    pub fn empty() -> Self {
        Self::new(Vec::new(), DEFAULT_DISTANCE_THRESHOLD)
    }
}

impl<M: Matcher> IdentityMatcher<M> {
    pub fn with_matcher(gallery: Vec<KnownIdentity>, threshold: f32, matcher: M) -> Self {
        Self {
            gallery,
            threshold,
            matcher,
        }
    }

    pub fn find_best_match(&self, query: &Descriptor) -> MatchResult {
        self.matcher.compare(query, &self.gallery, self.threshold)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.gallery.iter().map(|i| i.label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(label: &str, values: Vec<f32>) -> KnownIdentity {
        KnownIdentity {
            label: label.into(),
            descriptors: vec![Descriptor::new(values)],
        }
    }

    #[test]
    fn test_match_within_threshold() {
        let matcher = IdentityMatcher::new(vec![identity("christine", vec![0.0, 0.0])], 0.5);
        let result = matcher.find_best_match(&Descriptor::new(vec![0.3, 0.0]));
        assert!(result.matched());
        assert_eq!(result.display_label(), "christine");
        assert!((result.distance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_no_match_beyond_threshold() {
        let matcher = IdentityMatcher::new(vec![identity("christine", vec![0.0, 0.0])], 0.5);
        let result = matcher.find_best_match(&Descriptor::new(vec![0.6, 0.0]));
        assert!(!result.matched());
        assert_eq!(result.display_label(), UNKNOWN_LABEL);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let matcher = IdentityMatcher::new(vec![identity("james", vec![0.0])], 0.5);
        assert!(!matcher.find_best_match(&Descriptor::new(vec![0.5])).matched());
    }

    #[test]
    fn test_nearest_identity_wins() {
        // Best match is the last entry; every entry must be visited.
        let gallery = vec![
            identity("decoy1", vec![0.4, 0.0]),
            identity("decoy2", vec![0.0, 0.45]),
            identity("match", vec![0.1, 0.0]),
        ];
        let matcher = IdentityMatcher::new(gallery, 0.5);
        let result = matcher.find_best_match(&Descriptor::new(vec![0.0, 0.0]));
        assert_eq!(result.label.as_deref(), Some("match"));
    }

    #[test]
    fn test_mean_distance_over_descriptors() {
        let gallery = vec![KnownIdentity {
            label: "james".into(),
            descriptors: vec![Descriptor::new(vec![0.2]), Descriptor::new(vec![0.6])],
        }];
        let matcher = IdentityMatcher::new(gallery, 0.5);
        let result = matcher.find_best_match(&Descriptor::new(vec![0.0]));
        assert!((result.distance - 0.4).abs() < 1e-6);
        assert!(result.matched());
    }

    #[test]
    fn test_empty_gallery() {
        let result = IdentityMatcher::empty().find_best_match(&Descriptor::new(vec![1.0, 0.0]));
        assert!(!result.matched());
        assert_eq!(result.distance, f32::INFINITY);
    }

    /// Recognizer-style descriptor for a unit vector at `cos` from [1, 0].
    fn at_cosine(cos: f32) -> Descriptor {
        Descriptor::from_embedding(&[cos, (1.0 - cos * cos).sqrt()])
    }

    #[test]
    fn test_recognizer_descriptors_at_realistic_cosines() {
        let gallery = vec![KnownIdentity {
            label: "James".into(),
            descriptors: vec![at_cosine(1.0)],
        }];
        let matcher = IdentityMatcher::new(gallery, DEFAULT_DISTANCE_THRESHOLD);

        let same = matcher.find_best_match(&at_cosine(0.6));
        assert_eq!(same.display_label(), "James");
        assert!(same.distance < 0.5);

        let other = matcher.find_best_match(&at_cosine(0.2));
        assert_eq!(other.display_label(), UNKNOWN_LABEL);
        assert!(other.distance > 0.5);
    }

    #[test]
    fn test_dimension_mismatch_never_matches() {
        let matcher = IdentityMatcher::new(vec![identity("christine", vec![0.0; 128])], 0.5);
        let result = matcher.find_best_match(&Descriptor::new(vec![0.0; 512]));
        assert!(!result.matched());
    }
}
