//! Entity resolution: decide whether an incoming record names an entity the
//! graph already holds, and fold the record into it.
//!
//! Matching precedence, first hit wins:
//!   1. exact canonical name
//!   2. exact alias
//!   3. fuzzy match against a canonical name or any alias
//!
//! Fuzzy candidates are scanned in ascending canonical-name order, so when two
//! entities both clear the threshold the lexicographically smaller one wins.
//! Type and colour are fixed at creation and never overwritten by a merge.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use clinigraph_common::confidence::{combine_capped, sanitize_confidence};
use clinigraph_common::{Entity, EntityRecord, MergeSettings};

use crate::scoring::compute_size_within;
use crate::similarity::is_similar_at;

/// Which rule matched an incoming name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Alias,
    Fuzzy,
    New,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub canonical_name: String,
    pub is_new: bool,
    pub kind: MatchKind,
}

impl Resolution {
    fn existing(canonical_name: &str, kind: MatchKind) -> Self {
        Self { canonical_name: canonical_name.to_string(), is_new: false, kind }
    }
}

/// Entities keyed for resolution: canonical names in sorted order plus an
/// alias → canonical lookup table.
#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    entities: BTreeMap<String, Entity>,
    aliases: HashMap<String, String>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities<I: IntoIterator<Item = Entity>>(entities: I) -> Self {
        let mut index = Self::new();
        // Sort first so alias collisions are won by the smallest canonical name.
        let sorted: BTreeMap<String, Entity> = entities
            .into_iter()
            .map(|e| (e.canonical_name.clone(), e))
            .collect();
        for entity in sorted.into_values() {
            index.insert(entity);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, canonical_name: &str) -> Option<&Entity> {
        self.entities.get(canonical_name)
    }

    pub fn contains(&self, canonical_name: &str) -> bool {
        self.entities.contains_key(canonical_name)
    }

    /// Entities in canonical-name order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Insert or replace an entity, registering all its aliases.
    pub fn insert(&mut self, entity: Entity) {
        for alias in &entity.aliases {
            self.aliases
                .entry(alias.clone())
                .or_insert_with(|| entity.canonical_name.clone());
        }
        self.entities.insert(entity.canonical_name.clone(), entity);
    }

    /// Find the entity `name` refers to, or report that it is new.
    pub fn resolve(&self, name: &str, similarity_threshold: f64) -> Resolution {
        if self.entities.contains_key(name) {
            return Resolution::existing(name, MatchKind::Exact);
        }

        if let Some(canonical) = self.aliases.get(name) {
            if self.entities.contains_key(canonical) {
                return Resolution::existing(canonical, MatchKind::Alias);
            }
        }

        for entity in self.entities.values() {
            let hit = is_similar_at(name, &entity.canonical_name, similarity_threshold)
                || entity
                    .aliases
                    .iter()
                    .any(|alias| is_similar_at(name, alias, similarity_threshold));
            if hit {
                return Resolution::existing(&entity.canonical_name, MatchKind::Fuzzy);
            }
        }

        Resolution {
            canonical_name: name.to_string(),
            is_new: true,
            kind: MatchKind::New,
        }
    }
}

/// Resolves records against an index and computes merged entity state.
pub struct EntityResolver<'a> {
    settings: &'a MergeSettings,
}

impl<'a> EntityResolver<'a> {
    pub fn new(settings: &'a MergeSettings) -> Self {
        Self { settings }
    }

    /// Resolve a record's name against the index. `None` when the record has no usable name.
    pub fn resolve(&self, record: &EntityRecord, index: &EntityIndex) -> Option<Resolution> {
        let name = record.valid_name()?;
        Some(index.resolve(name, self.settings.similarity_threshold))
    }

    /// Build the post-merge state of the entity `resolution` points at.
    ///
    /// For an existing entity: aliases grow by the incoming name and aliases,
    /// confidence follows the capped running average, importance and size are
    /// recomputed, context is unioned, and type/colour are left as they were.
    /// For a new entity the same rules apply against a zero-confidence blank.
    pub fn merged_entity(
        &self,
        record: &EntityRecord,
        resolution: &Resolution,
        index: &EntityIndex,
        mention_count: usize,
        observed_at: DateTime<Utc>,
    ) -> Entity {
        let mut entity = match index.get(&resolution.canonical_name) {
            Some(existing) if !resolution.is_new => existing.clone(),
            _ => Entity::new(&resolution.canonical_name, record.parsed_type()),
        };

        if let Some(name) = record.valid_name() {
            entity.add_alias(name);
        }
        for alias in &record.aliases {
            if !alias.trim().is_empty() {
                entity.add_alias(alias);
            }
        }

        entity.confidence = combine_capped(
            entity.confidence,
            record.confidence,
            self.settings.max_confidence,
        );
        entity.importance = sanitize_confidence(record.effective_importance());

        if let Some(context) = &record.context {
            entity.context.absorb(context);
        }
        if let Some(summary) = record.summary.as_ref().filter(|s| !s.trim().is_empty()) {
            entity.summary = Some(summary.clone());
        }

        entity.visual_size = compute_size_within(
            entity.importance,
            mention_count,
            entity.entity_type,
            entity.aliases.len(),
            self.settings.min_size,
            self.settings.max_size,
        );
        entity.last_seen = observed_at;
        entity
    }
}
