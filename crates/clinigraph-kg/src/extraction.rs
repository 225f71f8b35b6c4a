//! Extraction and summarization seams.
//!
//! The text-understanding service is a black box: it either hands back a
//! `GraphBatch` or fails. An unparseable reply is an empty batch, never an
//! error, so a bad turn only costs that turn's information.

use std::sync::OnceLock;

use async_trait::async_trait;
use clinigraph_common::error::Result;
use clinigraph_common::{EmrRecord, Entity, GraphBatch};
use regex::Regex;
use tracing::{debug, warn};

/// Built-in instructions appended after the conversation text.
pub const DEFAULT_GRAPH_INSTRUCTIONS: &str = r#"From the conversation above, extract the patient's clinically relevant concepts as a graph.
Return ONLY a JSON object of the form:
{
  "nodes": [
    {"name": "...", "type": "Symptom|Condition|Trigger|Cause|Medication|Timing", "aliases": ["..."], "confidence": 0.0-1.0, "importance": 0.0-1.0}
  ],
  "edges": [
    {"from_node": "...", "to_node": "...", "type": "causes|treats|worsens|relieves|occurs_at|related_to", "confidence": 0.0-1.0}
  ]
}
Use the patient's own wording for node names. Every edge endpoint must be the name of a node in the list."#;

/// Built-in template for per-node summaries.
pub const DEFAULT_SUMMARY_TEMPLATE: &str = r#"You are preparing a pre-visit briefing for a clinician.
Node: {NODE_NAME} ({NODE_TYPE})
Context from the record and conversation:
{NODE_CONTEXT}
Connected concepts: {CONNECTED_NODES}
Patient record:
{EMR_DATA}
Conversation:
{TRANSCRIPT}
Write two or three sentences on what this concept means for this patient. Do not speculate beyond the data."#;

/// Turns a conversation fragment into a raw graph batch.
#[async_trait]
pub trait GraphExtractor: Send + Sync {
    async fn extract(&self, conversation: &str, instructions: &str) -> Result<GraphBatch>;
}

/// Everything a summarizer may draw on for one node.
#[derive(Debug, Clone)]
pub struct SummaryRequest<'a> {
    pub entity: &'a Entity,
    pub connected: Vec<String>,
    pub emr: &'a EmrRecord,
    pub transcript: &'a str,
}

#[async_trait]
pub trait NodeSummarizer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest<'_>) -> Result<String>;
}

/// The extraction prompt sent for one conversation window.
pub fn build_extraction_prompt(conversation: &str, instructions: &str) -> String {
    format!("Conversation: {conversation}\n\n{instructions}")
}

fn json_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Widest brace-delimited span, across lines
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap())
}

/// Pull a graph batch out of free-form model output.
///
/// Takes the widest `{ ... }` span. No span, or a span that is not JSON,
/// gives an empty batch. Individual records that fail to decode are dropped
/// and counted; the rest of the batch survives.
pub fn parse_graph_batch(raw: &str) -> GraphBatch {
    let Some(span) = json_block_regex().find(raw) else {
        warn!(output_len = raw.len(), "No JSON object in extraction output");
        return GraphBatch::default();
    };

    let value: serde_json::Value = match serde_json::from_str(span.as_str()) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Extraction output is not valid JSON");
            return GraphBatch::default();
        }
    };

    let (batch, dropped) = GraphBatch::from_value_lenient(&value);
    if dropped > 0 {
        warn!(dropped, "Dropped undecodable extraction records");
    }
    debug!(nodes = batch.nodes.len(), edges = batch.edges.len(), "Parsed extraction batch");
    batch
}
