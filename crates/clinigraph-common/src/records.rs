//! Wire records exchanged with the extraction service and the graph merge.
//!
//! Every field is optional on the way in: extractor output is of uncertain
//! quality and the merge decides record-by-record what it can use.

use serde::{Deserialize, Serialize};

use crate::entities::{EntityContext, EntityType};

/// Relation label used when an edge arrives without a type.
pub const DEFAULT_RELATION_TYPE: &str = "related_to";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntityRecord {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    pub importance: Option<f64>,
    pub context: Option<EntityContext>,
    pub summary: Option<String>,
}

impl EntityRecord {
    pub fn new(name: impl Into<String>, entity_type: EntityType, confidence: f64) -> Self {
        Self {
            name: Some(name.into()),
            entity_type: Some(entity_type.as_str().to_string()),
            confidence,
            ..Default::default()
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    /// The record's name, if present and not blank.
    pub fn valid_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }

    pub fn parsed_type(&self) -> EntityType {
        self.entity_type
            .as_deref()
            .map(EntityType::from_label)
            .unwrap_or_default()
    }

    /// Importance as supplied, defaulting to the record's confidence.
    pub fn effective_importance(&self) -> f64 {
        self.importance.unwrap_or(self.confidence)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelationRecord {
    pub from_node: Option<String>,
    pub to_node: Option<String>,
    #[serde(rename = "type")]
    pub relation_type: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

impl RelationRecord {
    pub fn new(
        from_node: impl Into<String>,
        to_node: impl Into<String>,
        relation_type: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            from_node: Some(from_node.into()),
            to_node: Some(to_node.into()),
            relation_type: Some(relation_type.into()),
            confidence,
        }
    }

    pub fn valid_from(&self) -> Option<&str> {
        self.from_node.as_deref().filter(|n| !n.trim().is_empty())
    }

    pub fn valid_to(&self) -> Option<&str> {
        self.to_node.as_deref().filter(|n| !n.trim().is_empty())
    }

    pub fn relation_type_or_default(&self) -> &str {
        self.relation_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_RELATION_TYPE)
    }
}

/// One extraction pass worth of nodes and edges, merged as a unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphBatch {
    #[serde(default)]
    pub nodes: Vec<EntityRecord>,
    #[serde(default)]
    pub edges: Vec<RelationRecord>,
}

impl GraphBatch {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Decode a batch from loosely-shaped JSON, record by record.
    /// Records that do not decode are dropped; the count is returned alongside.
    pub fn from_value_lenient(value: &serde_json::Value) -> (Self, usize) {
        let mut dropped = 0;
        let nodes = decode_each::<EntityRecord>(value.get("nodes"), &mut dropped);
        let edges = decode_each::<RelationRecord>(value.get("edges"), &mut dropped);
        (Self { nodes, edges }, dropped)
    }
}

fn decode_each<T: serde::de::DeserializeOwned>(
    items: Option<&serde_json::Value>,
    dropped: &mut usize,
) -> Vec<T> {
    let Some(items) = items.and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(record) => Some(record),
            Err(_) => {
                *dropped += 1;
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_fields_deserialize() {
        let rec: EntityRecord = serde_json::from_str(r#"{"type": "Symptom"}"#).unwrap();
        assert!(rec.valid_name().is_none());
        assert_eq!(rec.confidence, 0.0);
        assert_eq!(rec.parsed_type(), EntityType::Symptom);
    }

    #[test]
    fn test_blank_name_is_invalid() {
        let rec = EntityRecord { name: Some("   ".into()), ..Default::default() };
        assert!(rec.valid_name().is_none());
    }

    #[test]
    fn test_importance_defaults_to_confidence() {
        let rec = EntityRecord::new("nausea", EntityType::Symptom, 0.7);
        assert_eq!(rec.effective_importance(), 0.7);
        assert_eq!(rec.with_importance(0.2).effective_importance(), 0.2);
    }

    #[test]
    fn test_relation_type_defaults() {
        let rel = RelationRecord { relation_type: None, ..Default::default() };
        assert_eq!(rel.relation_type_or_default(), DEFAULT_RELATION_TYPE);
    }

    #[test]
    fn test_lenient_decode_drops_bad_records() {
        let value = serde_json::json!({
            "nodes": [
                {"name": "headache", "type": "Symptom", "confidence": 0.6},
                {"name": "stress", "confidence": "very high"}
            ],
            "edges": [
                {"from_node": "stress", "to_node": "headache", "type": "causes", "confidence": 0.5}
            ]
        });
        let (batch, dropped) = GraphBatch::from_value_lenient(&value);
        assert_eq!(batch.nodes.len(), 1);
        assert_eq!(batch.edges.len(), 1);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_batch_wire_shape() {
        let batch: GraphBatch = serde_json::from_str(
            r#"{"nodes": [{"name": "ibuprofen", "type": "Medication", "aliases": ["advil"], "confidence": 0.9}]}"#,
        )
        .unwrap();
        assert_eq!(
            batch.nodes[0],
            EntityRecord::new("ibuprofen", EntityType::Medication, 0.9).with_aliases(["advil"])
        );
        assert!(batch.edges.is_empty());
    }
}
