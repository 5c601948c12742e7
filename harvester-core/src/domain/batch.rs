//! Batch description types
//!
//! Immutable values built fresh for every submission attempt and consumed by
//! the backend client.

use serde::{Deserialize, Serialize};

/// How a file reaches the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMode {
    /// Content is embedded in the submission document
    Inline,
    /// The backend fetches the file from a path or URL
    Reference,
}

/// One input file of a job
///
/// Exactly one of inline content or source location exists, matching the mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FileDescription {
    Inline { content: String },
    Reference { source: String },
}

impl FileDescription {
    pub fn mode(&self) -> FileMode {
        match self {
            Self::Inline { .. } => FileMode::Inline,
            Self::Reference { .. } => FileMode::Reference,
        }
    }
}

/// One job inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    pub files: Vec<FileDescription>,
    /// Estimated floating point operations
    pub fpops_est: f64,
    pub command_line: String,
}

/// A complete submission payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDescription {
    pub app_name: String,
    pub batch_name: String,
    pub input_template: Option<String>,
    pub output_template: Option<String>,
    pub jobs: Vec<JobDescription>,
}
