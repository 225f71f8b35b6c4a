//! LLM-backed graph extraction.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use clinigraph_common::error::Result;
use clinigraph_common::GraphBatch;
use clinigraph_kg::extraction::{build_extraction_prompt, parse_graph_batch, GraphExtractor};
use tracing::warn;

use crate::audit::LlmAuditEntry;
use crate::backend::{LlmBackend, LlmRequest};

pub struct LlmGraphExtractor {
    backend: Arc<dyn LlmBackend>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl LlmGraphExtractor {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend, max_tokens: None, temperature: None }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
impl GraphExtractor for LlmGraphExtractor {
    /// A backend error is returned as `Extraction`; unparseable output is an
    /// empty batch.
    async fn extract(&self, conversation: &str, instructions: &str) -> Result<GraphBatch> {
        let mut request = LlmRequest::prompt(build_extraction_prompt(conversation, instructions));
        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;

        let started = Instant::now();
        let response = match self.backend.complete(request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(model = self.backend.model_id(), error = %e, "Extraction call failed");
                return Err(e.into());
            }
        };
        LlmAuditEntry::new(
            "extraction",
            self.backend.as_ref(),
            &response,
            started.elapsed().as_millis() as u64,
        )
        .emit();

        Ok(parse_graph_batch(&response.content))
    }
}
