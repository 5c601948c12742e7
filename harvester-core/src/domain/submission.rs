//! Submission result types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::worker::BatchId;
use crate::error::HarvesterError;

/// Outcome of submitting one unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionResult {
    /// The backend accepted the batch and assigned an identifier
    Success {
        batch_id: BatchId,
        message: Option<String>,
    },

    /// Must not be retried
    PermanentFailure { message: Option<String> },

    /// May be retried up to the site's attempt limit
    TemporaryFailure { message: Option<String> },
}

impl SubmissionResult {
    pub fn success(batch_id: BatchId) -> Self {
        Self::Success {
            batch_id,
            message: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::PermanentFailure {
            message: Some(message.into()),
        }
    }

    pub fn temporary(message: impl Into<String>) -> Self {
        Self::TemporaryFailure {
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success { message, .. }
            | Self::PermanentFailure { message }
            | Self::TemporaryFailure { message } => message.as_deref(),
        }
    }
}

impl From<HarvesterError> for SubmissionResult {
    fn from(err: HarvesterError) -> Self {
        if err.is_retryable() {
            Self::temporary(err.to_string())
        } else {
            Self::permanent(err.to_string())
        }
    }
}

impl fmt::Display for SubmissionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { batch_id, .. } => write!(f, "success (batch {})", batch_id),
            Self::PermanentFailure { message } => write!(
                f,
                "permanent failure: {}",
                message.as_deref().unwrap_or("no message")
            ),
            Self::TemporaryFailure { message } => write!(
                f,
                "temporary failure: {}",
                message.as_deref().unwrap_or("no message")
            ),
        }
    }
}
