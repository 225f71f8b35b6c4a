use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClinigraphError {
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Graph store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ClinigraphError>;
