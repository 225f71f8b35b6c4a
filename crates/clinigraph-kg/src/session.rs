//! Pre-visit session driver.
//!
//! One session walks a conversation turn by turn: extract, annotate, merge,
//! optionally summarise, then apply to the store. Every collaborator is
//! injected. Merges are serialised through `&mut self`; two sessions writing
//! the same store concurrently must be serialised by the caller.

use std::collections::HashSet;
use std::sync::Arc;

use clinigraph_common::error::Result;
use clinigraph_common::{EmrRecord, MergeSettings};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::annotate::{annotate_records, count_mentions};
use crate::extraction::{GraphExtractor, NodeSummarizer, SummaryRequest, DEFAULT_GRAPH_INSTRUCTIONS};
use crate::merge::{GraphMerger, GraphView, MergePlan, SkippedRecord};
use crate::repository::{apply_plan, ApplyReport, GraphStore};

/// What one `ingest` call did.
#[derive(Debug, Default)]
pub struct TurnOutcome {
    pub turn: usize,
    pub nodes_received: usize,
    pub edges_received: usize,
    pub entities_created: usize,
    pub entities_merged: usize,
    pub relations_upserted: usize,
    pub skipped: Vec<SkippedRecord>,
    /// The extractor errored; the turn was treated as carrying no information.
    pub extraction_failed: bool,
    pub apply: ApplyReport,
}

impl TurnOutcome {
    pub fn had_new_information(&self) -> bool {
        self.entities_created + self.entities_merged + self.relations_upserted > 0
    }
}

pub struct GraphSession {
    id: Uuid,
    store: Arc<dyn GraphStore>,
    extractor: Arc<dyn GraphExtractor>,
    summarizer: Option<Arc<dyn NodeSummarizer>>,
    merger: GraphMerger,
    instructions: String,
    clear_on_start: bool,
    /// Last view known to be in the store, used when the store cannot be read.
    last_view: GraphView,
    /// Upserts that failed to apply and are retried on the next turn. Newer
    /// upserts for the same entity or relation replace older ones.
    pending: MergePlan,
    turns: usize,
}

impl GraphSession {
    pub fn new(
        store: Arc<dyn GraphStore>,
        extractor: Arc<dyn GraphExtractor>,
        settings: MergeSettings,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            store,
            extractor,
            summarizer: None,
            merger: GraphMerger::new(settings),
            instructions: DEFAULT_GRAPH_INSTRUCTIONS.to_string(),
            clear_on_start: true,
            last_view: GraphView::default(),
            pending: MergePlan::default(),
            turns: 0,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn NodeSummarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_clear_on_start(mut self, clear: bool) -> Self {
        self.clear_on_start = clear;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Upserts still waiting to reach the store.
    pub fn pending(&self) -> &MergePlan {
        &self.pending
    }

    /// Begin the session, resetting the store when configured to.
    pub async fn start(&mut self) -> Result<()> {
        if self.clear_on_start {
            self.store.clear().await?;
            self.last_view = GraphView::default();
            info!(session = %self.id, "Cleared graph store for new session");
        } else {
            self.last_view = self.store.view().await?;
            info!(
                session = %self.id,
                entities = self.last_view.entities.len(),
                relations = self.last_view.relations.len(),
                "Resuming on existing graph"
            );
        }
        self.pending = MergePlan::default();
        self.turns = 0;
        Ok(())
    }

    /// Run one extraction/merge cycle over the conversation so far.
    pub async fn ingest(&mut self, conversation: &str, emr: &EmrRecord) -> TurnOutcome {
        self.turns += 1;
        let mut outcome = TurnOutcome { turn: self.turns, ..Default::default() };

        self.retry_pending().await;

        let mut batch = match self.extractor.extract(conversation, &self.instructions).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(session = %self.id, turn = self.turns, error = %e, "Extraction failed, treating turn as empty");
                outcome.extraction_failed = true;
                return outcome;
            }
        };
        outcome.nodes_received = batch.nodes.len();
        outcome.edges_received = batch.edges.len();
        if batch.is_empty() {
            debug!(session = %self.id, turn = self.turns, "No new information this turn");
            return outcome;
        }

        annotate_records(&mut batch.nodes, emr, conversation);
        let mention_counts =
            count_mentions(conversation, batch.nodes.iter().filter_map(|n| n.valid_name()));

        let mut view = match self.store.view().await {
            Ok(view) => view,
            Err(e) => {
                warn!(session = %self.id, error = %e, "Store unreadable, merging against last known view");
                self.last_view.clone()
            }
        };
        // Upserts still waiting on the store are part of the graph.
        view.apply(&self.pending);

        let mut plan = self.merger.merge_batch(&view, &batch, Some(&mention_counts));
        self.summarize(&mut plan, &view, emr, conversation).await;

        outcome.entities_created = plan.entities_created;
        outcome.entities_merged = plan.entities_merged;
        outcome.relations_upserted = plan.relation_upserts.len();
        outcome.skipped = plan.skipped.clone();

        outcome.apply = apply_plan(self.store.as_ref(), &plan).await;
        self.last_view = view;
        self.last_view.apply(&plan);
        self.pending.drop_superseded(&plan);
        self.pending.absorb(outcome.apply.retry_plan());

        info!(
            session = %self.id,
            turn = self.turns,
            created = outcome.entities_created,
            merged = outcome.entities_merged,
            relations = outcome.relations_upserted,
            skipped = outcome.skipped.len(),
            "Turn merged"
        );
        outcome
    }

    /// Replay a transcript as a growing conversation window.
    ///
    /// Each cycle adds `turns_per_batch` non-blank lines to the window and
    /// ingests the whole window. `turns_per_batch == 0` ingests the full
    /// transcript once. `max_cycles == 0` means no cycle limit.
    pub async fn run_transcript(
        &mut self,
        transcript: &str,
        emr: &EmrRecord,
        turns_per_batch: usize,
        max_cycles: usize,
    ) -> Vec<TurnOutcome> {
        let lines: Vec<&str> = transcript.lines().filter(|l| !l.trim().is_empty()).collect();
        let step = if turns_per_batch == 0 { lines.len().max(1) } else { turns_per_batch };

        let mut outcomes = Vec::new();
        let mut end = 0;
        while end < lines.len() {
            if max_cycles > 0 && outcomes.len() >= max_cycles {
                info!(session = %self.id, max_cycles, "Reached cycle limit");
                break;
            }
            end = (end + step).min(lines.len());
            let window = lines[..end].join("\n");
            outcomes.push(self.ingest(&window, emr).await);
        }
        outcomes
    }

    async fn retry_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        let report = apply_plan(self.store.as_ref(), &pending).await;
        if report.is_complete() {
            info!(session = %self.id, "Applied previously failed upserts");
        }
        self.pending = report.retry_plan();
    }

    async fn summarize(
        &self,
        plan: &mut MergePlan,
        view: &GraphView,
        emr: &EmrRecord,
        transcript: &str,
    ) {
        let Some(summarizer) = &self.summarizer else { return };

        let mut summaries = Vec::new();
        for (i, entity) in plan.entity_upserts.iter().enumerate() {
            let name = entity.canonical_name.as_str();
            let mut seen = HashSet::new();
            let connected: Vec<String> = view
                .relations
                .iter()
                .chain(plan.relation_upserts.iter())
                .filter_map(|r| {
                    if r.from_entity == name {
                        Some(r.to_entity.clone())
                    } else if r.to_entity == name {
                        Some(r.from_entity.clone())
                    } else {
                        None
                    }
                })
                .filter(|n| seen.insert(n.clone()))
                .collect();

            let request = SummaryRequest { entity, connected, emr, transcript };
            match summarizer.summarize(&request).await {
                Ok(text) if !text.trim().is_empty() => summaries.push((i, text.trim().to_string())),
                Ok(_) => {}
                Err(e) => warn!(entity = name, error = %e, "Node summary failed"),
            }
        }
        for (i, text) in summaries {
            plan.entity_upserts[i].summary = Some(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clinigraph_common::error::ClinigraphError;
    use clinigraph_common::{EntityRecord, EntityType, GraphBatch};
    use crate::repository::InMemoryGraphStore;
    use std::sync::Mutex;

    /// Records the conversation windows it was asked about.
    struct EchoExtractor {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GraphExtractor for EchoExtractor {
        async fn extract(&self, conversation: &str, _instructions: &str) -> Result<GraphBatch> {
            self.calls.lock().unwrap().push(conversation.to_string());
            Ok(GraphBatch {
                nodes: vec![EntityRecord::new("headache", EntityType::Symptom, 0.6)],
                edges: vec![],
            })
        }
    }

    struct BrokenExtractor;

    #[async_trait]
    impl GraphExtractor for BrokenExtractor {
        async fn extract(&self, _: &str, _: &str) -> Result<GraphBatch> {
            Err(ClinigraphError::Extraction("model offline".into()))
        }
    }

    #[tokio::test]
    async fn test_window_grows_by_step() {
        let extractor = Arc::new(EchoExtractor { calls: Mutex::new(Vec::new()) });
        let store = Arc::new(InMemoryGraphStore::new());
        let mut session = GraphSession::new(store, extractor.clone(), MergeSettings::default());
        session.start().await.unwrap();

        let outcomes = session
            .run_transcript("a\nb\n\nc\nd\ne", &EmrRecord::default(), 2, 0)
            .await;
        assert_eq!(outcomes.len(), 3);
        let calls = extractor.calls.lock().unwrap();
        assert_eq!(calls[0], "a\nb");
        assert_eq!(calls[2], "a\nb\nc\nd\ne");
    }

    #[tokio::test]
    async fn test_cycle_limit() {
        let extractor = Arc::new(EchoExtractor { calls: Mutex::new(Vec::new()) });
        let store = Arc::new(InMemoryGraphStore::new());
        let mut session = GraphSession::new(store, extractor, MergeSettings::default());
        let outcomes = session
            .run_transcript("a\nb\nc\nd", &EmrRecord::default(), 1, 2)
            .await;
        assert_eq!(outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_not_fatal() {
        let store = Arc::new(InMemoryGraphStore::new());
        let mut session =
            GraphSession::new(store.clone(), Arc::new(BrokenExtractor), MergeSettings::default());
        let outcome = session.ingest("Patient: my head hurts", &EmrRecord::default()).await;
        assert!(outcome.extraction_failed);
        assert!(!outcome.had_new_information());
        assert_eq!(store.entity_count().await, 0);
    }
}
