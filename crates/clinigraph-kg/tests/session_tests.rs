//! Session-level behaviour: turn loop, store outages, summaries, export.

use std::sync::Arc;

use async_trait::async_trait;
use clinigraph_common::error::{ClinigraphError, Result};
use clinigraph_common::{MergeSettings, GraphBatch};
use clinigraph_kg::extraction::{NodeSummarizer, SummaryRequest};
use clinigraph_kg::{export_frontend_graph, GraphSession, GraphStore, InMemoryGraphStore};
use clinigraph_test_utils::pretty_assertions::assert_eq;
use clinigraph_test_utils::{sample_emr, FlakyStore, ScriptedExtractor, SAMPLE_TRANSCRIPT};

const TURN_ONE: &str = r#"{
  "nodes": [
    {"name": "headaches", "type": "Symptom", "confidence": 0.8, "importance": 0.9},
    {"name": "bright light", "type": "Trigger", "confidence": 0.6}
  ],
  "edges": [
    {"from_node": "bright light", "to_node": "headaches", "type": "worsens", "confidence": 0.6}
  ]
}"#;

const TURN_TWO: &str = r#"{
  "nodes": [
    {"name": "Headache", "type": "Condition", "confidence": 0.6},
    {"name": "stress", "type": "Trigger", "confidence": 0.7},
    {"name": "Ibuprofen", "type": "Medication", "confidence": 0.9},
    {"type": "Symptom", "confidence": 0.9}
  ],
  "edges": [
    {"from_node": "stress", "to_node": "Headache", "type": "causes", "confidence": 0.7},
    {"from_node": "Ibuprofen", "to_node": "Headache", "type": "treats", "confidence": 0.4},
    {"from_node": "Ibuprofen", "confidence": 0.4}
  ]
}"#;

#[tokio::test]
async fn test_transcript_builds_deduplicated_graph() {
    let store = Arc::new(InMemoryGraphStore::new());
    let extractor = Arc::new(ScriptedExtractor::from_json(&[TURN_ONE, TURN_TWO]));
    let mut session = GraphSession::new(store.clone(), extractor.clone(), MergeSettings::default());
    session.start().await.unwrap();

    let outcomes = session.run_transcript(SAMPLE_TRANSCRIPT, &sample_emr(), 4, 0).await;
    assert_eq!(outcomes.len(), 2);
    assert_eq!(extractor.calls(), 2);
    assert_eq!(outcomes[1].skipped.len(), 2);

    let entities = store.find_all_entities().await.unwrap();
    let names: Vec<&str> = entities.iter().map(|e| e.canonical_name.as_str()).collect();
    assert_eq!(names, vec!["Ibuprofen", "bright light", "headaches", "stress"]);

    let headaches = &entities[2];
    assert_eq!(headaches.aliases, vec!["headaches".to_string(), "Headache".to_string()]);
    assert_eq!(headaches.entity_type.as_str(), "Symptom");
    assert!((headaches.confidence - 0.5).abs() < 1e-9);

    let ibuprofen = &entities[0];
    assert_eq!(ibuprofen.context.medications[0].name, "Ibuprofen");
    assert_eq!(ibuprofen.context.alerts.len(), 2);
    assert_eq!(ibuprofen.context.mentions, vec!["Patient: Ibuprofen, but it barely helps now.".to_string()]);

    let relations = store.find_all_relations().await.unwrap();
    assert_eq!(relations.len(), 3);
    assert!(relations.iter().all(|r| r.to_entity == "headaches"));
}

#[tokio::test]
async fn test_extraction_error_turn_does_not_stop_session() {
    let store = Arc::new(InMemoryGraphStore::new());
    let extractor = Arc::new(ScriptedExtractor::new(vec![
        Err(ClinigraphError::Extraction("timeout".into())),
        serde_json::from_str::<GraphBatch>(TURN_ONE).map_err(Into::into),
    ]));
    let mut session = GraphSession::new(store.clone(), extractor, MergeSettings::default());
    session.start().await.unwrap();

    let outcomes = session.run_transcript(SAMPLE_TRANSCRIPT, &sample_emr(), 4, 0).await;
    assert!(outcomes[0].extraction_failed);
    assert!(outcomes[1].had_new_information());
    assert_eq!(store.entity_count().await, 2);
}

#[tokio::test]
async fn test_store_outage_keeps_plan_for_retry() {
    let store = Arc::new(FlakyStore::new());
    let extractor = Arc::new(ScriptedExtractor::from_json(&[TURN_ONE, r#"{"nodes": [], "edges": []}"#]));
    let mut session = GraphSession::new(store.clone(), extractor, MergeSettings::default());
    session.start().await.unwrap();

    store.set_down(true);
    let emr = sample_emr();
    let first = session.ingest("Patient: headaches in bright light", &emr).await;
    assert_eq!(first.apply.failed_entities.len(), 2);
    assert_eq!(first.apply.failed_relations.len(), 1);
    assert_eq!(session.pending().entity_upserts.len(), 2);

    store.set_down(false);
    session.ingest("Patient: headaches in bright light", &emr).await;
    assert!(session.pending().is_empty());
    assert_eq!(store.inner().entity_count().await, 2);
    assert_eq!(store.inner().relation_count().await, 1);
}

#[tokio::test]
async fn test_consecutive_outages_keep_every_turn() {
    let store = Arc::new(FlakyStore::new());
    let extractor = Arc::new(ScriptedExtractor::from_json(&[
        r#"{"nodes": [{"name": "headache", "type": "Symptom", "confidence": 0.6}], "edges": []}"#,
        r#"{"nodes": [{"name": "stress", "type": "Trigger", "confidence": 0.7}], "edges": []}"#,
    ]));
    let mut session = GraphSession::new(store.clone(), extractor, MergeSettings::default());
    session.start().await.unwrap();
    let emr = sample_emr();

    store.set_down(true);
    session.ingest("Patient: I get headaches", &emr).await;
    session.ingest("Patient: I get headaches when stressed", &emr).await;
    let pending: Vec<&str> =
        session.pending().entity_upserts.iter().map(|e| e.canonical_name.as_str()).collect();
    assert_eq!(pending, vec!["headache", "stress"]);

    store.set_down(false);
    session.ingest("Patient: I get headaches when stressed", &emr).await;
    assert!(session.pending().is_empty());
    let stored: Vec<String> = store
        .inner()
        .find_all_entities()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.canonical_name)
        .collect();
    assert_eq!(stored, vec!["headache".to_string(), "stress".to_string()]);
}

#[tokio::test]
async fn test_unapplied_relation_still_accumulates_confidence() {
    let store = Arc::new(FlakyStore::new());
    store.set_fail_relations(true);
    let extractor = Arc::new(ScriptedExtractor::from_json(&[TURN_ONE, TURN_ONE]));
    let mut session = GraphSession::new(store.clone(), extractor, MergeSettings::default());
    session.start().await.unwrap();
    let emr = sample_emr();

    session.ingest("Patient: headaches in bright light", &emr).await;
    session.ingest("Patient: headaches in bright light", &emr).await;
    assert_eq!(session.pending().relation_upserts.len(), 1);
    // 0.3 after the first sighting, (0.3 + 0.6) / 2 after the second
    assert!((session.pending().relation_upserts[0].confidence - 0.45).abs() < 1e-9);

    store.set_fail_relations(false);
    session.ingest("Patient: headaches in bright light", &emr).await;
    assert!(session.pending().is_empty());
    let relations = store.inner().find_all_relations().await.unwrap();
    assert_eq!(relations.len(), 1);
    assert!((relations[0].confidence - 0.45).abs() < 1e-9);
}

#[tokio::test]
async fn test_rejected_relations_are_reported() {
    let store = Arc::new(FlakyStore::new());
    store.set_fail_relations(true);
    let extractor = Arc::new(ScriptedExtractor::from_json(&[TURN_ONE]));
    let mut session = GraphSession::new(store.clone(), extractor, MergeSettings::default());

    let outcome = session.ingest("Patient: headaches in bright light", &sample_emr()).await;
    assert_eq!(outcome.apply.entities_applied, 2);
    assert_eq!(outcome.apply.failed_relations.len(), 1);
    assert_eq!(session.pending().relation_upserts.len(), 1);
}

struct NamingSummarizer;

#[async_trait]
impl NodeSummarizer for NamingSummarizer {
    async fn summarize(&self, request: &SummaryRequest<'_>) -> Result<String> {
        if request.entity.canonical_name == "bright light" {
            return Err(ClinigraphError::Extraction("refused".into()));
        }
        Ok(format!(
            "{} linked to {}",
            request.entity.canonical_name,
            request.connected.join(", ")
        ))
    }
}

#[tokio::test]
async fn test_summaries_attached_and_failures_tolerated() {
    let store = Arc::new(InMemoryGraphStore::new());
    let extractor = Arc::new(ScriptedExtractor::from_json(&[TURN_ONE]));
    let mut session = GraphSession::new(store.clone(), extractor, MergeSettings::default())
        .with_summarizer(Arc::new(NamingSummarizer));
    session.start().await.unwrap();
    session.ingest(SAMPLE_TRANSCRIPT, &sample_emr()).await;

    let entities = store.find_all_entities().await.unwrap();
    let light = entities.iter().find(|e| e.canonical_name == "bright light").unwrap();
    let headaches = entities.iter().find(|e| e.canonical_name == "headaches").unwrap();
    assert_eq!(light.summary, None);
    assert_eq!(headaches.summary.as_deref(), Some("headaches linked to bright light"));

    let graph = export_frontend_graph(&entities, &store.find_all_relations().await.unwrap());
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges[0].edge_type, "worsens");
}

#[tokio::test]
async fn test_resume_without_clearing() {
    let store = Arc::new(InMemoryGraphStore::new());
    let first = Arc::new(ScriptedExtractor::from_json(&[TURN_ONE]));
    let mut session = GraphSession::new(store.clone(), first, MergeSettings::default());
    session.start().await.unwrap();
    session.ingest(SAMPLE_TRANSCRIPT, &sample_emr()).await;

    let second = Arc::new(ScriptedExtractor::from_json(&[TURN_ONE]));
    let mut resumed = GraphSession::new(store.clone(), second, MergeSettings::default())
        .with_clear_on_start(false);
    resumed.start().await.unwrap();
    let outcome = resumed.ingest(SAMPLE_TRANSCRIPT, &sample_emr()).await;
    assert_eq!(outcome.entities_created, 0);
    assert_eq!(outcome.entities_merged, 2);
}
