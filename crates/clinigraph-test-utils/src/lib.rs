//! Shared fixtures for Clinigraph tests: a sample patient record and
//! transcript, plus test doubles for the extractor and the graph store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use clinigraph_common::error::{ClinigraphError, Result};
use clinigraph_common::{EmrRecord, Entity, GraphBatch, Relation};
use clinigraph_kg::{GraphExtractor, GraphStore, InMemoryGraphStore};

pub use pretty_assertions;

pub const SAMPLE_EMR_JSON: &str = r#"{
  "patient_id": "98765",
  "demographics": {"age": 34, "sex": "F"},
  "conditions": [
    {"name": "Chronic Migraine", "diagnosed": "2017-05-10", "status": "chronic"},
    {"name": "Seasonal allergies", "diagnosed": "2012-03-01", "status": "active"}
  ],
  "medications": [
    {"name": "Ibuprofen", "dose": "200mg", "frequency": "as needed", "active": true, "indication": "headache"},
    {"name": "Sumatriptan", "dose": "50mg", "frequency": "at onset", "active": false, "indication": "migraine"}
  ],
  "labs": [],
  "allergies": ["penicillin"],
  "alerts": ["History of chronic migraine", "Allergic to penicillin"],
  "encounters": [],
  "lifestyle": {"sleep": "6-7 hours/night", "caffeine": "3 cups/day"}
}"#;

pub const SAMPLE_TRANSCRIPT: &str = "\
Assistant: What brings you in today?
Patient: I've had headaches almost every morning this week.
Assistant: How would you describe the pain?
Patient: Throbbing, mostly behind my eyes. Bright light makes the headaches worse.
Assistant: Anything that seems to set them off?
Patient: Stress at work, and I haven't been sleeping well.
Assistant: Are you taking anything for it?
Patient: Ibuprofen, but it barely helps now.
";

pub fn sample_emr() -> EmrRecord {
    match EmrRecord::from_json(SAMPLE_EMR_JSON) {
        Ok(emr) => emr,
        Err(e) => panic!("sample EMR fixture does not parse: {e}"),
    }
}

/// A fixed instant, for tests that compare `last_seen`.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

// ---------------------------------------------------------------------------
// Extractor doubles
// ---------------------------------------------------------------------------

/// Replays a fixed sequence of extraction results, then returns empty batches.
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<Result<GraphBatch>>>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn new<I: IntoIterator<Item = Result<GraphBatch>>>(script: I) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Script built from JSON batch literals.
    pub fn from_json(batches: &[&str]) -> Self {
        Self::new(batches.iter().map(|raw| {
            serde_json::from_str::<GraphBatch>(raw).map_err(ClinigraphError::from)
        }))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphExtractor for ScriptedExtractor {
    async fn extract(&self, _conversation: &str, _instructions: &str) -> Result<GraphBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| Ok(GraphBatch::default()))
    }
}

// ---------------------------------------------------------------------------
// Store doubles
// ---------------------------------------------------------------------------

/// An in-memory store that can be switched into an unavailable state.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryGraphStore,
    down: AtomicBool,
    fail_relations: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Keep entity writes working but reject every relation write.
    pub fn set_fail_relations(&self, fail: bool) {
        self.fail_relations.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryGraphStore {
        &self.inner
    }

    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ClinigraphError::StoreUnavailable("store is down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for FlakyStore {
    async fn find_all_entities(&self) -> Result<Vec<Entity>> {
        self.check()?;
        self.inner.find_all_entities().await
    }

    async fn find_all_relations(&self) -> Result<Vec<Relation>> {
        self.check()?;
        self.inner.find_all_relations().await
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        self.check()?;
        self.inner.upsert_entity(entity).await
    }

    async fn upsert_relation(&self, relation: &Relation) -> Result<()> {
        self.check()?;
        if self.fail_relations.load(Ordering::SeqCst) {
            return Err(ClinigraphError::StoreUnavailable("relation writes rejected".into()));
        }
        self.inner.upsert_relation(relation).await
    }

    async fn clear(&self) -> Result<()> {
        self.check()?;
        self.inner.clear().await
    }
}
