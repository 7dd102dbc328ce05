//! Name similarity strategies for fuzzy entity matching.

use std::collections::BTreeSet;

/// Scores how likely two item names refer to the same real-world item.
///
/// Implementations return a value in `[0.0, 1.0]`.
pub trait NameSimilarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Jaccard overlap of lowercased, punctuation-stripped token sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSetSimilarity;

impl NameSimilarity for TokenSetSimilarity {
    #[allow(clippy::cast_precision_loss)]
    fn score(&self, a: &str, b: &str) -> f64 {
        let a = token_set(a);
        let b = token_set(b);
        let union = a.union(&b).count();
        if union == 0 {
            return 0.0;
        }
        let intersection = a.intersection(&b).count();
        intersection as f64 / union as f64
    }
}

/// Lowercase, replace punctuation with whitespace, and split.
#[must_use]
pub fn tokens(s: &str) -> Vec<String> {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(ToOwned::to_owned)
        .collect()
}

#[must_use]
pub fn token_set(s: &str) -> BTreeSet<String> {
    tokens(s).into_iter().collect()
}

/// First normalized token of a name, used to prefilter match candidates.
#[must_use]
pub fn leading_token(s: &str) -> Option<String> {
    tokens(s).into_iter().next()
}

/// Normalized brand key: tokens joined by single spaces.
#[must_use]
pub fn brand_key(brand: &str) -> Option<String> {
    let joined = tokens(brand).join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Both brands are present and normalize to the same key.
#[must_use]
pub fn brands_match(a: Option<&str>, b: Option<&str>) -> bool {
    match (a.and_then(brand_key), b.and_then(brand_key)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_strip_punctuation_and_case() {
        assert_eq!(
            tokens("L'Oréal Paris — Revitalift, 1.7oz!"),
            vec!["l", "oréal", "paris", "revitalift", "1", "7oz"]
        );
    }

    #[test]
    fn identical_names_score_one() {
        let s = TokenSetSimilarity.score("Glow Recipe Toner", "glow recipe toner.");
        assert!((s - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn disjoint_names_score_zero() {
        assert!(TokenSetSimilarity.score("Air Fryer", "Lip Balm").abs() < f64::EPSILON);
        assert!(TokenSetSimilarity.score("", "!!!").abs() < f64::EPSILON);
    }

    #[test]
    fn partial_overlap_is_jaccard() {
        // {cerave, moisturizing, cream} vs {cerave, daily, moisturizing, lotion}: 2 / 5.
        let s = TokenSetSimilarity.score(
            "CeraVe Moisturizing Cream",
            "CeraVe Daily Moisturizing Lotion",
        );
        assert!((s - 0.4).abs() < 1e-9);
    }

    #[test]
    fn repeated_tokens_count_once() {
        let s = TokenSetSimilarity.score("mask mask mask", "mask");
        assert!((s - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn brand_matching_normalizes() {
        assert!(brands_match(Some("CeraVe"), Some(" cerave ")));
        assert!(brands_match(Some("The Ordinary."), Some("the ordinary")));
        assert!(!brands_match(Some("CeraVe"), None));
        assert!(!brands_match(Some("---"), Some("...")));
        assert!(!brands_match(Some("Olay"), Some("CeraVe")));
    }

    #[test]
    fn leading_token_skips_punctuation() {
        assert_eq!(leading_token("  (NEW) Snail Essence"), Some("new".to_string()));
        assert_eq!(leading_token("***"), None);
    }
}
