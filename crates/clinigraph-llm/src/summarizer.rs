//! LLM-backed node summaries.
//!
//! The template is filled by plain placeholder substitution:
//! `{NODE_NAME}`, `{NODE_TYPE}`, `{NODE_CONTEXT}`, `{CONNECTED_NODES}`,
//! `{EMR_DATA}`, `{TRANSCRIPT}`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use clinigraph_common::error::Result;
use clinigraph_kg::extraction::{NodeSummarizer, SummaryRequest, DEFAULT_SUMMARY_TEMPLATE};

use crate::audit::LlmAuditEntry;
use crate::backend::{LlmBackend, LlmRequest};

pub fn render_summary_prompt(template: &str, request: &SummaryRequest<'_>) -> Result<String> {
    let connected = if request.connected.is_empty() {
        "none".to_string()
    } else {
        request.connected.join(", ")
    };
    Ok(template
        .replace("{NODE_NAME}", &request.entity.canonical_name)
        .replace("{NODE_TYPE}", request.entity.entity_type.as_str())
        .replace("{NODE_CONTEXT}", &serde_json::to_string_pretty(&request.entity.context)?)
        .replace("{CONNECTED_NODES}", &connected)
        .replace("{EMR_DATA}", &serde_json::to_string_pretty(request.emr)?)
        .replace("{TRANSCRIPT}", request.transcript))
}

pub struct LlmNodeSummarizer {
    backend: Arc<dyn LlmBackend>,
    template: String,
}

impl LlmNodeSummarizer {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend, template: DEFAULT_SUMMARY_TEMPLATE.to_string() }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }
}

#[async_trait]
impl NodeSummarizer for LlmNodeSummarizer {
    async fn summarize(&self, request: &SummaryRequest<'_>) -> Result<String> {
        let prompt = render_summary_prompt(&self.template, request)?;
        let started = Instant::now();
        let response = self.backend.complete(LlmRequest::prompt(prompt)).await?;
        LlmAuditEntry::new(
            "summary",
            self.backend.as_ref(),
            &response,
            started.elapsed().as_millis() as u64,
        )
        .emit();
        Ok(response.content.trim().to_string())
    }
}
