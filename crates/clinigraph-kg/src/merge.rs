//! Batch graph merge.
//!
//! Turns one extraction batch into the set of entity and relation upserts that
//! bring the graph up to date. Nodes are always resolved before edges, since
//! edge endpoints are translated through the batch's name → canonical mapping.
//!
//! The merge is pure: it reads a `GraphView`, touches no store, and never
//! fails. Unusable records are reported in `MergePlan::skipped` and otherwise
//! ignored. Callers must not run two merges against the same graph at once;
//! the read-modify-write of confidence assumes a single writer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use clinigraph_common::confidence::{combine_capped, passes_floor, sanitize_confidence};
use clinigraph_common::{
    Entity, GraphBatch, MergeSettings, Relation, RelationKey,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::resolve::{EntityIndex, EntityResolver, MatchKind};

/// Current graph state the batch is merged against.
#[derive(Debug, Clone, Default)]
pub struct GraphView {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

impl GraphView {
    pub fn new(entities: Vec<Entity>, relations: Vec<Relation>) -> Self {
        Self { entities, relations }
    }

    /// Overlay a plan's upserts on this view, as a store would after applying it.
    pub fn apply(&mut self, plan: &MergePlan) {
        for upsert in &plan.entity_upserts {
            match self
                .entities
                .iter_mut()
                .find(|e| e.canonical_name == upsert.canonical_name)
            {
                Some(slot) => *slot = upsert.clone(),
                None => self.entities.push(upsert.clone()),
            }
        }
        for upsert in &plan.relation_upserts {
            let key = upsert.key();
            match self.relations.iter_mut().find(|r| r.key() == key) {
                Some(slot) => *slot = upsert.clone(),
                None => self.relations.push(upsert.clone()),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Node,
    Edge,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    MissingName,
    MissingEndpoint,
    BelowConfidenceFloor { confidence: f64 },
    /// The translated endpoint names no entity in the graph or the batch.
    DanglingEndpoint { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub kind: RecordKind,
    /// Position of the record in the batch's node or edge list.
    pub index: usize,
    pub reason: SkipReason,
}

/// Upserts computed for one batch. Each entity and relation appears at most
/// once, carrying its final state after the whole batch.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    pub entity_upserts: Vec<Entity>,
    pub relation_upserts: Vec<Relation>,
    /// Incoming node name → canonical name, for every node merged in this batch.
    pub canonical_names: HashMap<String, String>,
    pub skipped: Vec<SkippedRecord>,
    pub entities_created: usize,
    pub entities_merged: usize,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.entity_upserts.is_empty() && self.relation_upserts.is_empty()
    }

    pub fn entity(&self, canonical_name: &str) -> Option<&Entity> {
        self.entity_upserts.iter().find(|e| e.canonical_name == canonical_name)
    }

    pub fn relation(&self, key: &RelationKey) -> Option<&Relation> {
        self.relation_upserts.iter().find(|r| &r.key() == key)
    }

    /// Fold `newer` upserts into this plan. An entity or relation already
    /// present is replaced in place; anything else is appended.
    pub fn absorb(&mut self, newer: MergePlan) {
        for entity in newer.entity_upserts {
            match self
                .entity_upserts
                .iter_mut()
                .find(|e| e.canonical_name == entity.canonical_name)
            {
                Some(slot) => *slot = entity,
                None => self.entity_upserts.push(entity),
            }
        }
        for relation in newer.relation_upserts {
            let key = relation.key();
            match self.relation_upserts.iter_mut().find(|r| r.key() == key) {
                Some(slot) => *slot = relation,
                None => self.relation_upserts.push(relation),
            }
        }
    }

    /// Drop upserts for entities or relations that `newer` also carries.
    pub fn drop_superseded(&mut self, newer: &MergePlan) {
        self.entity_upserts.retain(|e| newer.entity(&e.canonical_name).is_none());
        self.relation_upserts.retain(|r| newer.relation(&r.key()).is_none());
    }
}

/// Keeps upserts unique while preserving first-touched order.
struct UpsertList<K, V> {
    items: Vec<V>,
    positions: HashMap<K, usize>,
}

impl<K: std::hash::Hash + Eq, V> UpsertList<K, V> {
    fn new() -> Self {
        Self { items: Vec::new(), positions: HashMap::new() }
    }

    fn put(&mut self, key: K, value: V) {
        match self.positions.get(&key) {
            Some(&pos) => self.items[pos] = value,
            None => {
                self.positions.insert(key, self.items.len());
                self.items.push(value);
            }
        }
    }
}

pub struct GraphMerger {
    settings: MergeSettings,
}

impl GraphMerger {
    /// Settings that fail validation are kept; sizing then falls back to
    /// the reference range.
    pub fn new(settings: MergeSettings) -> Self {
        if let Err(e) = settings.validate() {
            warn!(error = %e, "Merging with invalid settings");
        }
        Self { settings }
    }

    pub fn settings(&self) -> &MergeSettings {
        &self.settings
    }

    /// Merge `batch` into `view`, stamping touched records with the current time.
    pub fn merge_batch(
        &self,
        view: &GraphView,
        batch: &GraphBatch,
        mention_counts: Option<&HashMap<String, usize>>,
    ) -> MergePlan {
        self.merge_batch_at(view, batch, mention_counts, Utc::now())
    }

    pub fn merge_batch_at(
        &self,
        view: &GraphView,
        batch: &GraphBatch,
        mention_counts: Option<&HashMap<String, usize>>,
        observed_at: DateTime<Utc>,
    ) -> MergePlan {
        let resolver = EntityResolver::new(&self.settings);
        let mut index = EntityIndex::from_entities(view.entities.iter().cloned());
        let mut entity_upserts: UpsertList<String, Entity> = UpsertList::new();
        let mut plan = MergePlan::default();

        // Step 1: nodes. Each merged node is written back into the index so
        // later nodes in the same batch can resolve against it.
        for (i, record) in batch.nodes.iter().enumerate() {
            if !passes_floor(record.confidence, self.settings.confidence_floor) {
                plan.skipped.push(SkippedRecord {
                    kind: RecordKind::Node,
                    index: i,
                    reason: SkipReason::BelowConfidenceFloor { confidence: record.confidence },
                });
                continue;
            }
            let Some(resolution) = resolver.resolve(record, &index) else {
                plan.skipped.push(SkippedRecord {
                    kind: RecordKind::Node,
                    index: i,
                    reason: SkipReason::MissingName,
                });
                continue;
            };

            let name = record.valid_name().unwrap_or(resolution.canonical_name.as_str());
            let mention_count = mention_counts
                .and_then(|m| m.get(name).copied())
                .unwrap_or(0);
            let merged =
                resolver.merged_entity(record, &resolution, &index, mention_count, observed_at);

            match resolution.kind {
                MatchKind::New => plan.entities_created += 1,
                _ => plan.entities_merged += 1,
            }
            debug!(
                name,
                canonical = %resolution.canonical_name,
                kind = ?resolution.kind,
                confidence = merged.confidence,
                "Resolved node"
            );

            plan.canonical_names
                .insert(name.to_string(), resolution.canonical_name.clone());
            index.insert(merged.clone());
            entity_upserts.put(resolution.canonical_name, merged);
        }

        // Step 2: edges, with endpoints translated through the batch mapping.
        let mut relations: HashMap<RelationKey, Relation> =
            view.relations.iter().map(|r| (r.key(), r.clone())).collect();
        let mut relation_upserts: UpsertList<RelationKey, Relation> = UpsertList::new();

        for (i, record) in batch.edges.iter().enumerate() {
            let (Some(from_raw), Some(to_raw)) = (record.valid_from(), record.valid_to()) else {
                plan.skipped.push(SkippedRecord {
                    kind: RecordKind::Edge,
                    index: i,
                    reason: SkipReason::MissingEndpoint,
                });
                continue;
            };
            if !passes_floor(record.confidence, self.settings.confidence_floor) {
                plan.skipped.push(SkippedRecord {
                    kind: RecordKind::Edge,
                    index: i,
                    reason: SkipReason::BelowConfidenceFloor { confidence: record.confidence },
                });
                continue;
            }

            let from = plan.canonical_names.get(from_raw).map_or(from_raw, String::as_str);
            let to = plan.canonical_names.get(to_raw).map_or(to_raw, String::as_str);
            if let Some(dangling) = [from, to].into_iter().find(|n| !index.contains(n)) {
                plan.skipped.push(SkippedRecord {
                    kind: RecordKind::Edge,
                    index: i,
                    reason: SkipReason::DanglingEndpoint { name: dangling.to_string() },
                });
                continue;
            }

            let key = RelationKey::new(from, to, record.relation_type_or_default());
            let existing = relations.get(&key).map_or(0.0, |r| r.confidence);
            let relation = Relation {
                from_entity: key.from_entity.clone(),
                to_entity: key.to_entity.clone(),
                relation_type: key.relation_type.clone(),
                confidence: combine_capped(
                    existing,
                    sanitize_confidence(record.confidence),
                    self.settings.max_confidence,
                ),
                last_seen: observed_at,
            };
            relations.insert(key.clone(), relation.clone());
            relation_upserts.put(key, relation);
        }

        plan.entity_upserts = entity_upserts.items;
        plan.relation_upserts = relation_upserts.items;

        info!(
            nodes_in = batch.nodes.len(),
            edges_in = batch.edges.len(),
            created = plan.entities_created,
            merged = plan.entities_merged,
            relations = plan.relation_upserts.len(),
            skipped = plan.skipped.len(),
            "Merged graph batch"
        );
        plan
    }
}
