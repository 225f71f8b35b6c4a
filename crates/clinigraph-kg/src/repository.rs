//! Graph store seam.
//!
//! The store is the sole source of truth for the current graph view. Merges are
//! computed without it; `apply_plan` then pushes the result best-effort, and
//! anything that failed to apply is handed back to the caller for retry.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use clinigraph_common::error::{ClinigraphError, Result};
use clinigraph_common::{Entity, Relation, RelationKey};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::merge::{GraphView, MergePlan};

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn find_all_entities(&self) -> Result<Vec<Entity>>;

    async fn find_all_relations(&self) -> Result<Vec<Relation>>;

    /// Insert or replace the entity keyed by its canonical name.
    async fn upsert_entity(&self, entity: &Entity) -> Result<()>;

    /// Insert or replace the relation keyed by its (from, to, type) triple.
    async fn upsert_relation(&self, relation: &Relation) -> Result<()>;

    /// Drop every entity and relation.
    async fn clear(&self) -> Result<()>;

    /// Read the full current view.
    async fn view(&self) -> Result<GraphView> {
        Ok(GraphView::new(
            self.find_all_entities().await?,
            self.find_all_relations().await?,
        ))
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    entities: Vec<Entity>,
    relations: Vec<Relation>,
}

/// Process-local store. Entities are returned in canonical-name order and
/// relations in triple order.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    entities: RwLock<BTreeMap<String, Entity>>,
    relations: RwLock<BTreeMap<RelationKey, Relation>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entity_count(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn relation_count(&self) -> usize {
        self.relations.read().await.len()
    }

    /// Write the whole graph to `path` as pretty-printed JSON.
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = Snapshot {
            entities: self.entities.read().await.values().cloned().collect(),
            relations: self.relations.read().await.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path.as_ref(), json).await?;
        info!(
            path = %path.as_ref().display(),
            entities = snapshot.entities.len(),
            relations = snapshot.relations.len(),
            "Saved graph snapshot"
        );
        Ok(())
    }

    /// Replace the store contents with a snapshot written by `save_snapshot`.
    pub async fn load_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;

        let mut entities = self.entities.write().await;
        let mut relations = self.relations.write().await;
        *entities = snapshot
            .entities
            .into_iter()
            .map(|e| (e.canonical_name.clone(), e))
            .collect();
        *relations = snapshot
            .relations
            .into_iter()
            .map(|r| (r.key(), r))
            .collect();
        info!(
            path = %path.as_ref().display(),
            entities = entities.len(),
            relations = relations.len(),
            "Loaded graph snapshot"
        );
        Ok(())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn find_all_entities(&self) -> Result<Vec<Entity>> {
        Ok(self.entities.read().await.values().cloned().collect())
    }

    async fn find_all_relations(&self) -> Result<Vec<Relation>> {
        Ok(self.relations.read().await.values().cloned().collect())
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        self.entities
            .write()
            .await
            .insert(entity.canonical_name.clone(), entity.clone());
        Ok(())
    }

    async fn upsert_relation(&self, relation: &Relation) -> Result<()> {
        let entities = self.entities.read().await;
        for endpoint in [&relation.from_entity, &relation.to_entity] {
            if !entities.contains_key(endpoint) {
                return Err(ClinigraphError::MalformedRecord(format!(
                    "relation endpoint '{endpoint}' is not a stored entity"
                )));
            }
        }
        drop(entities);
        self.relations.write().await.insert(relation.key(), relation.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entities.write().await.clear();
        self.relations.write().await.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Plan application
// ---------------------------------------------------------------------------

/// Outcome of applying a merge plan. Failed operations keep their full
/// payload so they can be retried later.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub entities_applied: usize,
    pub relations_applied: usize,
    pub failed_entities: Vec<(Entity, String)>,
    pub failed_relations: Vec<(Relation, String)>,
}

impl ApplyReport {
    pub fn is_complete(&self) -> bool {
        self.failed_entities.is_empty() && self.failed_relations.is_empty()
    }

    /// Leftover upserts as a plan, for a later retry.
    pub fn retry_plan(&self) -> MergePlan {
        MergePlan {
            entity_upserts: self.failed_entities.iter().map(|(e, _)| e.clone()).collect(),
            relation_upserts: self.failed_relations.iter().map(|(r, _)| r.clone()).collect(),
            ..Default::default()
        }
    }
}

/// Push a plan into `store`: entities first, then relations. Individual
/// failures are collected; the call itself never fails.
pub async fn apply_plan(store: &dyn GraphStore, plan: &MergePlan) -> ApplyReport {
    let mut report = ApplyReport::default();

    for entity in &plan.entity_upserts {
        match store.upsert_entity(entity).await {
            Ok(()) => report.entities_applied += 1,
            Err(e) => {
                warn!(entity = %entity.canonical_name, error = %e, "Entity upsert failed");
                report.failed_entities.push((entity.clone(), e.to_string()));
            }
        }
    }

    for relation in &plan.relation_upserts {
        match store.upsert_relation(relation).await {
            Ok(()) => report.relations_applied += 1,
            Err(e) => {
                warn!(
                    from = %relation.from_entity,
                    to = %relation.to_entity,
                    relation_type = %relation.relation_type,
                    error = %e,
                    "Relation upsert failed"
                );
                report.failed_relations.push((relation.clone(), e.to_string()));
            }
        }
    }

    if !report.is_complete() {
        warn!(
            failed_entities = report.failed_entities.len(),
            failed_relations = report.failed_relations.len(),
            "Plan applied partially"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clinigraph_common::EntityType;

    fn relation(from: &str, to: &str) -> Relation {
        Relation {
            from_entity: from.into(),
            to_entity: to.into(),
            relation_type: "causes".into(),
            confidence: 0.4,
            last_seen: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_canonical_name() {
        let store = InMemoryGraphStore::new();
        let mut e = Entity::new("nausea", EntityType::Symptom);
        store.upsert_entity(&e).await.unwrap();
        e.confidence = 0.7;
        store.upsert_entity(&e).await.unwrap();

        let all = store.find_all_entities().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].confidence, 0.7);
    }

    #[tokio::test]
    async fn test_relation_requires_endpoints() {
        let store = InMemoryGraphStore::new();
        assert!(store.upsert_relation(&relation("stress", "headache")).await.is_err());
    }

    #[tokio::test]
    async fn test_apply_plan_reports_failures_and_keeps_going() {
        let store = InMemoryGraphStore::new();
        let plan = MergePlan {
            entity_upserts: vec![
                Entity::new("stress", EntityType::Trigger),
                Entity::new("headache", EntityType::Symptom),
            ],
            relation_upserts: vec![relation("stress", "headache"), relation("stress", "ghost")],
            ..Default::default()
        };
        let report = apply_plan(&store, &plan).await;
        assert_eq!(report.entities_applied, 2);
        assert_eq!(report.relations_applied, 1);
        assert_eq!(report.failed_relations.len(), 1);
        assert_eq!(report.retry_plan().relation_upserts[0].to_entity, "ghost");
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryGraphStore::new();
        store.upsert_entity(&Entity::new("stress", EntityType::Trigger)).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.entity_count().await, 0);
    }

    #[tokio::test]
    async fn test_snapshot_restores_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let store = InMemoryGraphStore::new();
        store.upsert_entity(&Entity::new("stress", EntityType::Trigger)).await.unwrap();
        store.upsert_entity(&Entity::new("headache", EntityType::Symptom)).await.unwrap();
        store.upsert_relation(&relation("stress", "headache")).await.unwrap();
        store.save_snapshot(&path).await.unwrap();

        let restored = InMemoryGraphStore::new();
        restored.load_snapshot(&path).await.unwrap();
        assert_eq!(restored.entity_count().await, 2);
        assert_eq!(restored.relation_count().await, 1);
        assert_eq!(
            restored.find_all_entities().await.unwrap(),
            store.find_all_entities().await.unwrap()
        );
    }
}
