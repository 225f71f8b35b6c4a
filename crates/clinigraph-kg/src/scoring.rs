//! Visual-weight ("size") score for graph nodes.
//!
//! size = min + (max - min) * score, where
//! score = 0.50·importance + 0.25·aliases/5 + 0.15·type_priority + 0.10·mentions/10
//! with both counts saturating at 1.0.

use clinigraph_common::EntityType;

pub const MIN_SIZE: f64 = 40.0;
pub const MAX_SIZE: f64 = 100.0;

const MENTION_SATURATION: f64 = 10.0;
const ALIAS_SATURATION: f64 = 5.0;

const W_IMPORTANCE: f64 = 0.50;
const W_ALIASES: f64 = 0.25;
const W_TYPE: f64 = 0.15;
const W_MENTIONS: f64 = 0.10;

/// Compute the node size within the reference [40, 100] range.
pub fn compute_size(
    importance: f64,
    mention_count: usize,
    entity_type: EntityType,
    alias_count: usize,
) -> f64 {
    compute_size_within(importance, mention_count, entity_type, alias_count, MIN_SIZE, MAX_SIZE)
}

/// Compute the node size within `[min_size, max_size]`. Total: inputs are
/// clamped first, so the result never leaves the range. Bounds that are not
/// finite or are inverted fall back to [`MIN_SIZE`, `MAX_SIZE`].
pub fn compute_size_within(
    importance: f64,
    mention_count: usize,
    entity_type: EntityType,
    alias_count: usize,
    min_size: f64,
    max_size: f64,
) -> f64 {
    let (min_size, max_size) =
        if min_size.is_finite() && max_size.is_finite() && min_size <= max_size {
            (min_size, max_size)
        } else {
            (MIN_SIZE, MAX_SIZE)
        };
    let importance = if importance.is_finite() { importance.clamp(0.0, 1.0) } else { 0.0 };
    let norm_mentions = (mention_count as f64 / MENTION_SATURATION).min(1.0);
    let norm_aliases = (alias_count as f64 / ALIAS_SATURATION).min(1.0);

    let score = W_IMPORTANCE * importance
        + W_ALIASES * norm_aliases
        + W_TYPE * entity_type.priority()
        + W_MENTIONS * norm_mentions;

    (min_size + (max_size - min_size) * score).clamp(min_size, max_size)
}
