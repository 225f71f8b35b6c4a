//! clinigraph-llm — LLM backends and the LLM-backed extractor and summarizer.

pub mod backend;
pub mod audit;
pub mod extractor;
pub mod summarizer;

pub use backend::{LlmBackend, LlmError, OllamaBackend, OpenAiBackend, OpenAiCompatibleBackend};
pub use extractor::LlmGraphExtractor;
pub use summarizer::LlmNodeSummarizer;
