use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing file, undecodable bytes or a column layout we cannot map.
    #[error("failed to load {}: {reason}", .path.display())]
    DataLoad { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pattern for brand '{brand}': {source}")]
    Pattern {
        brand: String,
        #[source]
        source: regex::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    pub fn data_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::DataLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_data_load(&self) -> bool {
        matches!(self, PipelineError::DataLoad { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
