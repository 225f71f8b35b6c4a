//! clinigraph-common — Shared types, errors, and settings used across all Clinigraph crates.

pub mod error;
pub mod entities;
pub mod records;
pub mod emr;
pub mod confidence;
pub mod settings;

// Re-export commonly used types
pub use entities::{Entity, EntityContext, EntityType, Relation, RelationKey};
pub use records::{EntityRecord, GraphBatch, RelationRecord};
pub use emr::EmrRecord;
pub use settings::MergeSettings;
