//! Error taxonomy shared by every harvester component
//!
//! Local I/O and parsing errors are converted into one of these kinds at the
//! component boundary. Raw transport errors never travel past the client.

use thiserror::Error;

use crate::domain::worker::WorkerStatus;

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvesterError>;

/// Errors surfaced by the submission and reconciliation layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarvesterError {
    /// A required local input (shared file, site entry) is missing or unreadable
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A batch was requested for zero workers
    #[error("cannot build a batch from zero workers")]
    EmptyBatch,

    /// Network failure, timeout or malformed transport-level response
    #[error("transient transport error: {0}")]
    TransientTransport(String),

    /// The backend explicitly rejected the request
    #[error("backend rejected request: {0}")]
    BackendApplication(String),

    /// Output artifacts could not be downloaded or unpacked
    #[error("artifact retrieval failed: {0}")]
    Retrieval(String),

    /// A status poll returned something the mapping table cannot interpret
    #[error("unparseable status report: {0}")]
    UnparseableStatusReport(String),

    /// A state change that is not an edge of the worker state machine
    #[error("invalid worker transition from {from} to {to}")]
    InvalidTransition { from: WorkerStatus, to: WorkerStatus },

    /// An operation was invoked in a state where it is not allowed
    #[error("misuse: {0}")]
    Misuse(String),
}

impl HarvesterError {
    /// Whether a submission that failed with this error may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientTransport(_))
    }
}
