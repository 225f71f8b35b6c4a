//! Confidence accumulation for entities and relations.
//!
//! Repeated observations are folded in as a saturating running average, not a
//! sum: `min(cap, (existing + incoming) / 2)`. The same rule applies to entity
//! and relation confidence.

/// Upper bound on any accumulated confidence.
pub const MAX_CONFIDENCE: f64 = 1.0;

/// Records whose incoming confidence is below this are discarded before merging.
pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.1;

/// Clamp a raw confidence into [0.0, 1.0]. Non-finite values become 0.0.
pub fn sanitize_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Combine an existing confidence with a new observation, capped at `max`.
pub fn combine_capped(existing: f64, incoming: f64, max: f64) -> f64 {
    let avg = (sanitize_confidence(existing) + sanitize_confidence(incoming)) / 2.0;
    avg.min(max)
}

/// Combine an existing confidence with a new observation using the default cap.
pub fn combine_confidence(existing: f64, incoming: f64) -> f64 {
    combine_capped(existing, incoming, MAX_CONFIDENCE)
}

/// Does an incoming record carry enough confidence to be merged at all?
pub fn passes_floor(incoming: f64, floor: f64) -> bool {
    sanitize_confidence(incoming) >= floor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_starts_from_zero() {
        assert!((combine_confidence(0.0, 0.6) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_merge_pulls_average_up() {
        assert!((combine_confidence(0.3, 0.8) - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_order_independent() {
        assert_eq!(combine_confidence(0.2, 0.9), combine_confidence(0.9, 0.2));
    }

    #[test]
    fn test_capped() {
        assert!(combine_capped(1.0, 1.0, 0.8) <= 0.8);
        assert!(combine_confidence(5.0, 5.0) <= MAX_CONFIDENCE);
    }

    #[test]
    fn test_repeated_weak_observations_do_not_inflate() {
        let mut c = 0.0;
        for _ in 0..50 {
            c = combine_confidence(c, 0.2);
        }
        assert!(c <= 0.2 + 1e-9);
    }

    #[test]
    fn test_floor_filter() {
        assert!(!passes_floor(0.05, DEFAULT_CONFIDENCE_FLOOR));
        assert!(passes_floor(0.1, DEFAULT_CONFIDENCE_FLOOR));
        assert!(!passes_floor(f64::NAN, DEFAULT_CONFIDENCE_FLOOR));
    }
}
