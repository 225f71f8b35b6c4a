//! Tunables for entity resolution and graph merging.
//!
//! Passed explicitly into the merge engine; nothing here is process-global.

use serde::{Deserialize, Serialize};

use crate::confidence::{DEFAULT_CONFIDENCE_FLOOR, MAX_CONFIDENCE};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergeSettings {
    /// Minimum similarity ratio for two names to be treated as the same concept.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Incoming records below this confidence are dropped before merging.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,

    #[serde(default = "default_max_confidence")]
    pub max_confidence: f64,

    #[serde(default = "default_min_size")]
    pub min_size: f64,

    #[serde(default = "default_max_size")]
    pub max_size: f64,
}

fn default_similarity_threshold() -> f64 { 0.85 }
fn default_confidence_floor()     -> f64 { DEFAULT_CONFIDENCE_FLOOR }
fn default_max_confidence()       -> f64 { MAX_CONFIDENCE }
fn default_min_size()             -> f64 { 40.0 }
fn default_max_size()             -> f64 { 100.0 }

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            confidence_floor: default_confidence_floor(),
            max_confidence: default_max_confidence(),
            min_size: default_min_size(),
            max_size: default_max_size(),
        }
    }
}

impl MergeSettings {
    /// Disable the confidence floor so every well-formed record is merged.
    pub fn without_floor(mut self) -> Self {
        self.confidence_floor = 0.0;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Check the settings are internally consistent.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::ClinigraphError;

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ClinigraphError::Config(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.max_confidence) {
            return Err(ClinigraphError::Config(format!(
                "max_confidence must be within [0, 1], got {}",
                self.max_confidence
            )));
        }
        if !(self.min_size.is_finite() && self.max_size.is_finite() && self.min_size <= self.max_size) {
            return Err(ClinigraphError::Config(format!(
                "min_size ({}) and max_size ({}) must be finite with min <= max",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}
