//! Structured patient-record (EMR) shape consumed by the context annotator.
//! Only the sections the annotator reads are typed; everything else is carried through.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmrRecord {
    pub patient_id: Option<String>,
    #[serde(default)]
    pub conditions: Vec<EmrCondition>,
    #[serde(default)]
    pub medications: Vec<EmrMedication>,
    #[serde(default)]
    pub alerts: Vec<String>,
    /// Demographics, labs, allergies, encounters, lifestyle, …
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmrCondition {
    #[serde(default)]
    pub name: String,
    pub diagnosed: Option<String>,
    pub status: Option<String>,
    /// Severity, notes, treating clinician, …
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmrMedication {
    #[serde(default)]
    pub name: String,
    pub dose: Option<String>,
    pub frequency: Option<String>,
    pub active: Option<bool>,
    pub indication: Option<String>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl EmrRecord {
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
