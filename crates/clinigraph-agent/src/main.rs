//! Clinigraph — pre-visit clinical knowledge graph builder.
//! Entry point for the agent binary.
//!
//! Usage: clinigraph [TRANSCRIPT] [EMR_JSON]
//! Paths default to the [session] section of clinigraph.toml.

mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clinigraph_common::EmrRecord;
use clinigraph_kg::{export_frontend_graph, GraphSession, GraphStore, InMemoryGraphStore};
use clinigraph_llm::{
    LlmBackend, LlmGraphExtractor, LlmNodeSummarizer, OllamaBackend, OpenAiBackend,
    OpenAiCompatibleBackend,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn build_llm_backend(config: &config::LlmConfig) -> anyhow::Result<Arc<dyn LlmBackend>> {
    let backend: Arc<dyn LlmBackend> = match config.provider.as_str() {
        "ollama" => Arc::new(OllamaBackend::new(&config.base_url, &config.model)),
        "openai" => {
            let Some(key) = config.resolve_api_key() else {
                anyhow::bail!(
                    "OpenAI configured but no API key found \
                     (set llm.api_key, CLINIGRAPH_OPENAI_API_KEY or OPENAI_API_KEY)"
                );
            };
            Arc::new(OpenAiBackend::new(key, &config.model))
        }
        "openai_compatible" => Arc::new(OpenAiCompatibleBackend::new(
            &config.base_url,
            &config.model,
            config.resolve_api_key(),
        )),
        other => anyhow::bail!(
            "Unknown llm.provider '{other}' (expected ollama, openai or openai_compatible)"
        ),
    };
    Ok(backend)
}

async fn read_optional(path: Option<&str>) -> anyhow::Result<Option<String>> {
    match path {
        Some(p) => Ok(Some(
            tokio::fs::read_to_string(p)
                .await
                .with_context(|| format!("reading {p}"))?,
        )),
        None => Ok(None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("clinigraph=debug,info")),
        )
        .init();

    info!("Clinigraph starting up...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match config::Config::load() {
        Ok(c) => {
            info!("Configuration loaded. LLM provider: {}, model: {}", c.llm.provider, c.llm.model);
            c
        }
        Err(e) => {
            warn!("Could not load clinigraph.toml: {e}");
            warn!("Copy clinigraph.example.toml to clinigraph.toml and edit it.");
            return Ok(());
        }
    };

    let mut args = std::env::args().skip(1);
    let transcript_path = args.next().unwrap_or_else(|| config.session.transcript_path.clone());
    let emr_path = args.next().unwrap_or_else(|| config.session.emr_path.clone());

    let transcript = tokio::fs::read_to_string(&transcript_path)
        .await
        .with_context(|| format!("reading transcript {transcript_path}"))?;
    let emr_json = tokio::fs::read_to_string(&emr_path)
        .await
        .with_context(|| format!("reading EMR {emr_path}"))?;
    let emr = EmrRecord::from_json(&emr_json)?;
    info!(
        transcript_lines = transcript.lines().count(),
        patient = emr.patient_id.as_deref().unwrap_or("unknown"),
        "Inputs loaded"
    );

    let backend = build_llm_backend(&config.llm)?;
    info!(backend = backend.name(), model = backend.model_id(), local = backend.is_local(), "LLM backend ready");

    let mut extractor = LlmGraphExtractor::new(backend.clone()).with_temperature(config.llm.temperature);
    if let Some(max_tokens) = config.llm.max_tokens {
        extractor = extractor.with_max_tokens(max_tokens);
    }

    let store = Arc::new(InMemoryGraphStore::new());
    let snapshot_path = Path::new(&config.session.snapshot_path);
    if !config.session.clear_on_start && snapshot_path.exists() {
        store.load_snapshot(snapshot_path).await?;
    }

    let mut session = GraphSession::new(store.clone(), Arc::new(extractor), config.merge.clone())
        .with_clear_on_start(config.session.clear_on_start);
    if let Some(instructions) = read_optional(config.extraction.instructions_path.as_deref()).await? {
        session = session.with_instructions(instructions);
    }
    if config.session.summarize_nodes {
        let mut summarizer = LlmNodeSummarizer::new(backend.clone());
        if let Some(template) = read_optional(config.extraction.summary_template_path.as_deref()).await? {
            summarizer = summarizer.with_template(template);
        }
        session = session.with_summarizer(Arc::new(summarizer));
    }

    session.start().await?;
    info!(session = %session.id(), "Session started");

    let outcomes = session
        .run_transcript(
            &transcript,
            &emr,
            config.session.turns_per_batch,
            config.session.max_cycles,
        )
        .await;

    let failed_turns = outcomes.iter().filter(|o| o.extraction_failed).count();
    let skipped: usize = outcomes.iter().map(|o| o.skipped.len()).sum();
    if !session.pending().is_empty() {
        warn!(
            entities = session.pending().entity_upserts.len(),
            relations = session.pending().relation_upserts.len(),
            "Some upserts never reached the store"
        );
    }

    store.save_snapshot(snapshot_path).await?;

    let entities = store.find_all_entities().await?;
    let relations = store.find_all_relations().await?;
    let graph = export_frontend_graph(&entities, &relations);
    tokio::fs::write(&config.session.export_path, graph.to_json_pretty()?)
        .await
        .with_context(|| format!("writing {}", config.session.export_path))?;

    info!(
        cycles = outcomes.len(),
        failed_turns,
        skipped_records = skipped,
        entities = entities.len(),
        relations = relations.len(),
        export = %config.session.export_path,
        "Session complete"
    );

    Ok(())
}
