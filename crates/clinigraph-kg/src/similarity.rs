//! Name similarity for entity resolution.
//!
//! Two names denote the same concept when the character-level match ratio of
//! their lower-cased forms, 2·M / (len a + len b), reaches the threshold.

use similar::TextDiff;

/// Reference threshold for fuzzy name matching.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Case-insensitive similarity ratio in [0.0, 1.0]. Two empty strings score 1.0.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    f64::from(TextDiff::from_chars(a.as_str(), b.as_str()).ratio())
}

/// Are `a` and `b` similar at the reference threshold?
pub fn is_similar(a: &str, b: &str) -> bool {
    is_similar_at(a, b, DEFAULT_SIMILARITY_THRESHOLD)
}

pub fn is_similar_at(a: &str, b: &str, threshold: f64) -> bool {
    similarity_ratio(a, b) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural_is_similar() {
        assert!(is_similar("headache", "Headaches"));
    }

    #[test]
    fn test_short_plurals_are_similar() {
        // 2·5 / 11
        assert!((similarity_ratio("cough", "coughs") - 10.0 / 11.0).abs() < 1e-6);
        assert!(is_similar("cough", "coughs"));
        assert!(is_similar("Fever", "fevers"));
    }

    #[test]
    fn test_case_only_difference_is_identical() {
        assert_eq!(similarity_ratio("Nausea", "nausea"), 1.0);
    }

    #[test]
    fn test_empty_names() {
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("", "nausea"), 0.0);
    }

    #[test]
    fn test_distinct_concepts_not_similar() {
        assert!(!is_similar("headache", "heartburn"));
        assert!(!is_similar("stress", "sleep loss"));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let r = similarity_ratio("dizziness", "dizzyness");
        assert!(is_similar_at("dizziness", "dizzyness", r));
    }
}
