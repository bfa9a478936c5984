//! Unified error types for ciport

use thiserror::Error;

/// Unified error type for all ciport operations
#[derive(Error, Debug)]
pub enum CiportError {
    // LLM collaborator errors
    #[error("API error: {0}")]
    Api(String),

    #[error("API limit: {0}")]
    ApiLimit(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    // Repair loop step failures (fatal to the run)
    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Candidate generation failed: {0}")]
    Generation(String),

    #[error("Error analysis failed: {0}")]
    Analysis(String),

    #[error("Documentation summary failed: {0}")]
    Summarization(String),

    #[error("Quality judgment failed: {0}")]
    QualityJudgment(String),

    // Validator errors (tool crash, not an invalid candidate)
    #[error("Validator error: {0}")]
    Validator(String),

    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using CiportError
pub type Result<T> = std::result::Result<T, CiportError>;
