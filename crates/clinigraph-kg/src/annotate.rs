//! Deterministic EMR and transcript context for entities.
//!
//! Nothing here calls out to a model. An entity matches an EMR condition or
//! medication when its name is a case-insensitive substring of that record's
//! name; it matches a transcript line when its name appears in the line.
//! All EMR alerts are attached to every entity.

use std::collections::HashMap;

use clinigraph_common::{EmrRecord, Entity, EntityContext, EntityRecord};
use tracing::debug;

/// Build the context bag for a single name.
pub fn build_context(name: &str, emr: &EmrRecord, transcript: &str) -> EntityContext {
    let needle = name.to_lowercase();
    if needle.trim().is_empty() {
        return EntityContext { alerts: emr.alerts.clone(), ..Default::default() };
    }

    let past_conditions = emr
        .conditions
        .iter()
        .filter(|c| c.name.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    let medications = emr
        .medications
        .iter()
        .filter(|m| m.name.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    let mentions = transcript
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.to_lowercase().contains(&needle))
        .map(str::to_string)
        .collect();

    EntityContext {
        past_conditions,
        medications,
        mentions,
        alerts: emr.alerts.clone(),
    }
}

/// Return annotated copies of `entities`. Existing context is kept and the
/// freshly derived context is unioned into it.
pub fn annotate(entities: &[Entity], emr: &EmrRecord, transcript: &str) -> Vec<Entity> {
    entities
        .iter()
        .map(|entity| {
            let mut annotated = entity.clone();
            annotated
                .context
                .absorb(&build_context(&entity.canonical_name, emr, transcript));
            annotated
        })
        .collect()
}

/// Attach context to incoming records before they are merged.
pub fn annotate_records(records: &mut [EntityRecord], emr: &EmrRecord, transcript: &str) {
    let mut annotated = 0usize;
    for record in records.iter_mut() {
        let Some(name) = record.valid_name() else { continue };
        let context = build_context(name, emr, transcript);
        match record.context.as_mut() {
            Some(existing) => existing.absorb(&context),
            None => record.context = Some(context),
        }
        annotated += 1;
    }
    debug!(annotated, "Attached EMR and transcript context");
}

/// Non-overlapping case-insensitive occurrences of each name in `text`.
pub fn count_mentions<'a, I>(text: &str, names: I) -> HashMap<String, usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let haystack = text.to_lowercase();
    names
        .into_iter()
        .map(|name| {
            let needle = name.to_lowercase();
            let count = if needle.is_empty() { 0 } else { haystack.matches(&needle).count() };
            (name.to_string(), count)
        })
        .collect()
}
