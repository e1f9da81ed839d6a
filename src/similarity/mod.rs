//! Tag-set similarity.
//!
//! Two policies are supported: plain Jaccard over tag sets, and Jaccard where
//! every tag counts with its [`WeightCache`] weight.

pub mod related;
pub mod weights;

use std::collections::HashSet;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

pub use related::{RelatedFinder, RelatedItem};
pub use weights::{IdfFormula, WeightCache, WeightOptions, UNKNOWN_TAG_WEIGHT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityPolicy {
    Jaccard,
    #[default]
    Weighted,
}

impl SimilarityPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "jaccard" | "unweighted" => Some(SimilarityPolicy::Jaccard),
            "weighted" | "weighted_jaccard" => Some(SimilarityPolicy::Weighted),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SimilarityPolicy::Jaccard => "jaccard",
            SimilarityPolicy::Weighted => "weighted",
        }
    }

    pub fn score(self, a: &HashSet<&str>, b: &HashSet<&str>, weights: &WeightCache) -> f64 {
        match self {
            SimilarityPolicy::Jaccard => jaccard(a, b),
            SimilarityPolicy::Weighted => weighted_jaccard(a, b, |tag| weights.weight_for(tag)),
        }
    }
}

/// `|A ∩ B| / |A ∪ B|`, or 0 when either set is empty.
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// `Σ w(A ∩ B) / Σ w(A ∪ B)`, or 0 when either set is empty or the union
/// weighs nothing.
pub fn weighted_jaccard<T, F>(a: &HashSet<T>, b: &HashSet<T>, weight: F) -> f64
where
    T: Eq + Hash,
    F: Fn(&T) -> f64,
{
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut intersection = 0.0;
    let mut union = 0.0;
    for tag in a {
        let w = weight(tag);
        union += w;
        if b.contains(tag) {
            intersection += w;
        }
    }
    for tag in b.difference(a) {
        union += weight(tag);
    }
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set<'a>(tags: &[&'a str]) -> HashSet<&'a str> {
        tags.iter().copied().collect()
    }

    #[test]
    fn jaccard_basics() {
        assert_eq!(jaccard(&set(&["a", "b"]), &set(&["a", "b"])), 1.0);
        assert_eq!(jaccard(&set(&["a"]), &set(&["b"])), 0.0);
        assert_eq!(jaccard(&set(&[]), &set(&["b"])), 0.0);
        assert!((jaccard(&set(&["a", "b", "c"]), &set(&["b", "c", "d"])) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn weighted_jaccard_uses_weights() {
        let a = set(&["rare", "common"]);
        let b = set(&["rare", "other"]);
        let score = weighted_jaccard(&a, &b, |t| if *t == "rare" { 3.0 } else { 1.0 });
        assert!((score - 3.0 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn zero_union_weight_scores_zero() {
        let a = set(&["x"]);
        assert_eq!(weighted_jaccard(&a, &a, |_| 0.0), 0.0);
    }

    #[test]
    fn policy_names_parse() {
        assert_eq!(SimilarityPolicy::parse("Jaccard"), Some(SimilarityPolicy::Jaccard));
        assert_eq!(SimilarityPolicy::parse("weighted"), Some(SimilarityPolicy::Weighted));
        assert_eq!(SimilarityPolicy::parse("cosine"), None);
    }

    fn tag_sets() -> impl Strategy<Value = (HashSet<u8>, HashSet<u8>)> {
        (
            proptest::collection::hash_set(0u8..20, 0..12),
            proptest::collection::hash_set(0u8..20, 0..12),
        )
    }

    proptest! {
        #[test]
        fn jaccard_is_symmetric_and_bounded((a, b) in tag_sets()) {
            let ab = jaccard(&a, &b);
            prop_assert!((ab - jaccard(&b, &a)).abs() < 1e-12);
            prop_assert!((0.0..=1.0).contains(&ab));
            if !a.is_empty() {
                prop_assert!((jaccard(&a, &a) - 1.0).abs() < 1e-12);
            }
            if a.is_disjoint(&b) {
                prop_assert_eq!(ab, 0.0);
            }
        }

        #[test]
        fn unit_weights_match_unweighted((a, b) in tag_sets()) {
            let plain = jaccard(&a, &b);
            let weighted = weighted_jaccard(&a, &b, |_| 1.0);
            prop_assert!((plain - weighted).abs() < 1e-12);
        }
    }
}
