use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LatticeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binary not found or not executable: {0}")]
    MissingBinary(PathBuf),

    #[error("Incomplete acquisition parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid processing configuration: {0}")]
    Configuration(String),

    #[error("GPU worker on slot {slot} {reason} (exit code: {code:?})")]
    SubprocessCrash {
        slot: u32,
        reason: String,
        code: Option<i32>,
    },

    #[error("{stage} failed: {message}")]
    PipelineStage { stage: String, message: String },

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Archive entry escapes target directory: {0}")]
    PathTraversal(PathBuf),

    #[error("Processing log error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LatticeError>;
