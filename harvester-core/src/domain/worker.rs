//! Worker domain model
//!
//! A worker is one unit of work submitted to a remote backend. It carries the
//! canonical lifecycle status and the identifiers needed to track it there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::domain::submission::SubmissionResult;
use crate::error::{HarvesterError, Result};
use crate::reconcile::Reconciliation;

/// Caller-assigned worker identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-assigned batch identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical worker status
///
/// `Pending -> Submitted -> Running -> {Finished, Failed, Cancelled}`.
/// `Failed` and `Cancelled` may also be reached directly from the earlier states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Pending,
    Submitted,
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl WorkerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }

    /// Submitted or running: the backend knows about this worker
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Submitted | Self::Running)
    }

    /// Whether `next` is an edge of the state machine starting at `self`
    pub fn can_transition_to(self, next: WorkerStatus) -> bool {
        use WorkerStatus::*;
        match self {
            Pending => matches!(next, Submitted | Failed | Cancelled),
            Submitted => matches!(next, Running | Finished | Failed | Cancelled),
            Running => matches!(next, Finished | Failed | Cancelled),
            Finished | Failed | Cancelled => false,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Pending => "pending",
            WorkerStatus::Submitted => "submitted",
            WorkerStatus::Running => "running",
            WorkerStatus::Finished => "finished",
            WorkerStatus::Failed => "failed",
            WorkerStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A job carried by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    pub job_id: u64,
    /// Remote input locations the backend should stage for this job
    #[serde(default)]
    pub input_files: Vec<String>,
}

/// Locations of the log artifacts published for a worker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFiles {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub batch_log: Option<String>,
}

/// One unit of work tracked on a remote backend
///
/// The batch identifier is set exactly once, when the worker moves from
/// pending to submitted. Status only moves forward along the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub site: String,
    pub n_core: u32,
    pub native_status: Option<String>,
    pub log_files: LogFiles,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    status: WorkerStatus,
    batch_id: Option<BatchId>,
    batch_slot: Option<usize>,
    diagnostic: Option<String>,
    jobs: Arc<[JobRef]>,
    submission_attempts: u32,
}

impl Worker {
    /// Creates a pending worker for a site
    pub fn new(id: WorkerId, site: impl Into<String>, n_core: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            site: site.into(),
            n_core,
            native_status: None,
            log_files: LogFiles::default(),
            created_at: now,
            modified_at: now,
            status: WorkerStatus::Pending,
            batch_id: None,
            batch_slot: None,
            diagnostic: None,
            jobs: Arc::from(Vec::new()),
            submission_attempts: 0,
        }
    }

    /// Attaches the jobs this worker carries
    pub fn with_jobs(mut self, jobs: Arc<[JobRef]>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    pub fn batch_id(&self) -> Option<&BatchId> {
        self.batch_id.as_ref()
    }

    /// Index of this worker's job inside its batch
    pub fn batch_slot(&self) -> Option<usize> {
        self.batch_slot
    }

    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    pub fn jobs(&self) -> &[JobRef] {
        &self.jobs
    }

    pub fn submission_attempts(&self) -> u32 {
        self.submission_attempts
    }

    /// Moves the worker along one edge of the state machine
    ///
    /// Terminal states always end up with a diagnostic; a generic one is
    /// recorded when none is given. `Submitted` is only reachable once a
    /// batch id is known, i.e. through [`Worker::apply_submission`].
    pub fn transition(&mut self, next: WorkerStatus, diagnostic: Option<String>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(HarvesterError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if next == WorkerStatus::Submitted && self.batch_id.is_none() {
            return Err(HarvesterError::Misuse(format!(
                "worker {} cannot be submitted without a batch id",
                self.id
            )));
        }

        self.diagnostic = match diagnostic {
            Some(message) => Some(message),
            None if next.is_terminal() => Some(format!("worker {} {}", self.id, next)),
            None => self.diagnostic.take(),
        };
        self.status = next;
        self.modified_at = Utc::now();
        Ok(())
    }

    /// Cancels a pending or submitted worker
    ///
    /// Unconditional from the caller's point of view; any submission already in
    /// flight is discarded when its result arrives.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<()> {
        match self.status {
            WorkerStatus::Pending | WorkerStatus::Submitted => {
                self.transition(WorkerStatus::Cancelled, Some(reason.into()))
            }
            other => Err(HarvesterError::Misuse(format!(
                "worker {} cannot be cancelled while {}",
                self.id, other
            ))),
        }
    }

    /// Applies the outcome of a submission attempt
    ///
    /// Returns `false` when the result arrived for a worker that is no longer
    /// pending (typically cancelled while the call was in flight) and was dropped.
    pub fn apply_submission(&mut self, result: &SubmissionResult, slot: usize) -> Result<bool> {
        if self.status != WorkerStatus::Pending {
            warn!(
                worker_id = %self.id,
                status = %self.status,
                "Discarding late submission result: {}",
                result
            );
            return Ok(false);
        }

        match result {
            SubmissionResult::Success { batch_id, message } => {
                self.batch_id = Some(batch_id.clone());
                if let Err(e) = self.transition(WorkerStatus::Submitted, None) {
                    self.batch_id = None;
                    return Err(e);
                }
                self.diagnostic = message.clone();
                self.batch_slot = Some(slot);
            }
            SubmissionResult::PermanentFailure { message } => {
                let message = message
                    .clone()
                    .unwrap_or_else(|| "submission permanently rejected".to_string());
                self.transition(WorkerStatus::Failed, Some(message))?;
            }
            SubmissionResult::TemporaryFailure { message } => {
                self.submission_attempts += 1;
                self.diagnostic = message.clone();
                self.modified_at = Utc::now();
            }
        }
        Ok(true)
    }

    /// Applies the outcome of one reconciliation
    ///
    /// Returns `false` when the update was stale and dropped.
    pub fn apply_reconciliation(&mut self, update: &Reconciliation) -> Result<bool> {
        if update.worker_id != self.id {
            return Err(HarvesterError::Misuse(format!(
                "reconciliation for worker {} applied to worker {}",
                update.worker_id, self.id
            )));
        }

        if update.status == self.status {
            if update.native_status.is_some() {
                self.native_status = update.native_status.clone();
            }
            if update.diagnostic.is_some() {
                self.diagnostic = update.diagnostic.clone();
            }
            return Ok(true);
        }

        if !self.status.can_transition_to(update.status) {
            warn!(
                worker_id = %self.id,
                "Dropping stale reconciliation {} -> {}",
                self.status,
                update.status
            );
            return Ok(false);
        }

        self.native_status = update.native_status.clone();
        self.transition(update.status, update.diagnostic.clone())?;
        Ok(true)
    }

    pub fn set_log_files(&mut self, log_files: LogFiles) {
        self.log_files = log_files;
        self.modified_at = Utc::now();
    }
}
