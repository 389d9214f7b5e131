use std::path::PathBuf;

use thiserror::Error;

/// Central error type for encore-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("duration must be between {min} and {max} seconds, got {got}")]
    InvalidDuration { got: u32, min: u32, max: u32 },

    #[error("unknown model variant: {0}")]
    UnknownModel(String),

    #[error("invalid model directory {path}: missing {missing}")]
    ModelDir { path: PathBuf, missing: String },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("separator error: {0}")]
    Separator(String),
}

pub type Result<T> = std::result::Result<T, Error>;
