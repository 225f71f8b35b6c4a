//! Configuration loading for Clinigraph.
//! Reads clinigraph.toml from the current directory or path in CLINIGRAPH_CONFIG env var.

use clinigraph_common::MergeSettings;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub merge: MergeSettings,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    /// "ollama" | "openai" | "openai_compatible"
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

fn default_provider()    -> String { "ollama".to_string() }
fn default_model()       -> String { "llama3:8b".to_string() }
fn default_base_url()    -> String { "http://localhost:11434".to_string() }
fn default_temperature() -> f32    { 0.1 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

fn deserialize_secret<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SecretString>, D::Error> {
    Ok(Option::<String>::deserialize(d)?
        .filter(|k| !k.trim().is_empty())
        .map(SecretString::from))
}

impl LlmConfig {
    /// API key from the config file, else `CLINIGRAPH_OPENAI_API_KEY`, else `OPENAI_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<SecretString> {
        if let Some(key) = &self.api_key {
            return Some(SecretString::from(key.expose_secret().to_string()));
        }
        ["CLINIGRAPH_OPENAI_API_KEY", "OPENAI_API_KEY"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|k| !k.trim().is_empty())
            .map(SecretString::from)
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_transcript_path")]
    pub transcript_path: String,
    #[serde(default = "default_emr_path")]
    pub emr_path: String,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    #[serde(default = "default_export_path")]
    pub export_path: String,
    /// Transcript lines added to the conversation window per cycle. 0 = all at once.
    #[serde(default = "default_turns_per_batch")]
    pub turns_per_batch: usize,
    /// 0 = no limit.
    #[serde(default)]
    pub max_cycles: usize,
    #[serde(default = "bool_true")]
    pub clear_on_start: bool,
    #[serde(default)]
    pub summarize_nodes: bool,
}

fn default_transcript_path() -> String { "transcript.txt".to_string() }
fn default_emr_path()        -> String { "emr.json".to_string() }
fn default_snapshot_path()   -> String { "graph_snapshot.json".to_string() }
fn default_export_path()     -> String { "frontend_graph.json".to_string() }
fn default_turns_per_batch() -> usize  { 2 }
fn bool_true()               -> bool   { true }

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transcript_path: default_transcript_path(),
            emr_path: default_emr_path(),
            snapshot_path: default_snapshot_path(),
            export_path: default_export_path(),
            turns_per_batch: default_turns_per_batch(),
            max_cycles: 0,
            clear_on_start: bool_true(),
            summarize_nodes: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtractionConfig {
    /// File whose contents replace the built-in graph extraction instructions.
    pub instructions_path: Option<String>,
    /// File whose contents replace the built-in node summary template.
    pub summary_template_path: Option<String>,
}


impl Config {
    /// Load configuration from clinigraph.toml.
    /// Checks CLINIGRAPH_CONFIG env var first, then current directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CLINIGRAPH_CONFIG")
            .unwrap_or_else(|_| "clinigraph.toml".to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy clinigraph.example.toml to clinigraph.toml and edit it.",
                path.display()
            );
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.merge.validate()?;
        Ok(config)
    }
}
