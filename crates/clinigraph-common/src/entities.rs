//! Core graph types: clinical entities and the directed relations between them.
//! These are the merged, persisted forms; raw extractor output lives in `records`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::emr::{EmrCondition, EmrMedication};

// ---------------------------------------------------------------------------
// Entity type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum EntityType {
    Symptom,
    Condition,
    Trigger,
    Cause,
    Medication,
    Timing,
    #[default]
    Unknown,
}

impl EntityType {
    /// Sizing priority for this type. Types without an explicit weight get 0.5.
    pub fn priority(&self) -> f64 {
        match self {
            EntityType::Condition  => 1.0,
            EntityType::Symptom    => 0.9,
            EntityType::Medication => 0.7,
            EntityType::Trigger    => 0.6,
            EntityType::Timing     => 0.5,
            EntityType::Cause | EntityType::Unknown => 0.5,
        }
    }

    /// Display colour used by the graph visualiser.
    pub fn color(&self) -> &'static str {
        match self {
            EntityType::Symptom    => "#ff6666",
            EntityType::Condition  => "#66b3ff",
            EntityType::Trigger    => "#ffcc66",
            EntityType::Cause      => "#ffcc66",
            EntityType::Timing     => "#99cc99",
            EntityType::Medication => "#9966ff",
            EntityType::Unknown    => "#cccccc",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Symptom    => "Symptom",
            EntityType::Condition  => "Condition",
            EntityType::Trigger    => "Trigger",
            EntityType::Cause      => "Cause",
            EntityType::Medication => "Medication",
            EntityType::Timing     => "Timing",
            EntityType::Unknown    => "Unknown",
        }
    }

    /// Parse an extractor-supplied label. Matching is case-insensitive and
    /// anything unrecognised maps to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "symptom"    => EntityType::Symptom,
            "condition"  => EntityType::Condition,
            "trigger"    => EntityType::Trigger,
            "cause"      => EntityType::Cause,
            "medication" => EntityType::Medication,
            "timing"     => EntityType::Timing,
            _            => EntityType::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Deterministic EMR / transcript facts linked to an entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntityContext {
    #[serde(default)]
    pub past_conditions: Vec<EmrCondition>,
    #[serde(default)]
    pub medications: Vec<EmrMedication>,
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default)]
    pub alerts: Vec<String>,
}

impl EntityContext {
    pub fn is_empty(&self) -> bool {
        self.past_conditions.is_empty()
            && self.medications.is_empty()
            && self.mentions.is_empty()
            && self.alerts.is_empty()
    }

    /// Union `other` into `self`, keeping first-seen order and dropping duplicates.
    pub fn absorb(&mut self, other: &EntityContext) {
        extend_unique(&mut self.past_conditions, &other.past_conditions);
        extend_unique(&mut self.medications, &other.medications);
        extend_unique(&mut self.mentions, &other.mentions);
        extend_unique(&mut self.alerts, &other.alerts);
    }
}

fn extend_unique<T: Clone + PartialEq>(into: &mut Vec<T>, from: &[T]) {
    for item in from {
        if !into.contains(item) {
            into.push(item.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub canonical_name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub color: String,
    /// Every name ever used for this entity, in first-seen order.
    pub aliases: Vec<String>,
    pub confidence: f64,
    pub importance: f64,
    #[serde(default)]
    pub context: EntityContext,
    pub summary: Option<String>,
    pub visual_size: f64,
    pub last_seen: DateTime<Utc>,
}

impl Entity {
    /// Create a fresh entity whose alias list contains only its canonical name.
    pub fn new(canonical_name: impl Into<String>, entity_type: EntityType) -> Self {
        let canonical_name = canonical_name.into();
        Self {
            aliases: vec![canonical_name.clone()],
            canonical_name,
            entity_type,
            color: entity_type.color().to_string(),
            confidence: 0.0,
            importance: 0.0,
            context: EntityContext::default(),
            summary: None,
            visual_size: 0.0,
            last_seen: Utc::now(),
        }
    }

    pub fn has_alias(&self, name: &str) -> bool {
        self.aliases.iter().any(|a| a == name)
    }

    /// Add an alias if not already present. Returns true if the list grew.
    pub fn add_alias(&mut self, name: &str) -> bool {
        if name.is_empty() || self.has_alias(name) {
            return false;
        }
        self.aliases.push(name.to_string());
        true
    }
}

// ---------------------------------------------------------------------------
// Relation
// ---------------------------------------------------------------------------

/// Identity of a relation: at most one relation exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationKey {
    pub from_entity: String,
    pub to_entity: String,
    pub relation_type: String,
}

impl RelationKey {
    pub fn new(
        from_entity: impl Into<String>,
        to_entity: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            from_entity: from_entity.into(),
            to_entity: to_entity.into(),
            relation_type: relation_type.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    pub from_entity: String,
    pub to_entity: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    pub confidence: f64,
    pub last_seen: DateTime<Utc>,
}

impl Relation {
    pub fn key(&self) -> RelationKey {
        RelationKey::new(&self.from_entity, &self.to_entity, &self.relation_type)
    }
}
