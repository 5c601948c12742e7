//! Status reconciliation
//!
//! Folds a backend status report into the canonical worker state machine.
//! The result depends only on the worker's current status and the report,
//! never on time or attempt counts, so repeated polls with the same report
//! are idempotent.
//!
//! Backend vocabularies live in independent mapping tables behind
//! [`StatusMap`]; a site selects its table through configuration.

mod boinc;
mod compute_vm;

pub use boinc::BoincStatusMap;
pub use compute_vm::ComputeVmStatusMap;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::domain::site::StatusMapKind;
use crate::domain::worker::{Worker, WorkerId, WorkerStatus};
use crate::error::HarvesterError;

/// Status of one job as reported by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    status: String,
    error: Option<String>,
}

impl JobReport {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            error: None,
        }
    }

    /// Attaches a backend error message to this job
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub(crate) fn status(&self) -> &str {
        &self.status
    }

    pub(crate) fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReportKind {
    Batch {
        state: Option<String>,
        jobs: Vec<JobReport>,
    },
    ProtocolError(String),
    Unreachable(String),
    Malformed(String),
}

/// Raw answer to a status query
///
/// Built by backend clients; only this module reads its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatusReport {
    batch_id: String,
    kind: ReportKind,
}

impl BackendStatusReport {
    /// A parsed batch with per-job statuses, ordered by job slot
    pub fn batch(batch_id: impl Into<String>, state: Option<String>, jobs: Vec<JobReport>) -> Self {
        Self {
            batch_id: batch_id.into(),
            kind: ReportKind::Batch { state, jobs },
        }
    }

    /// The backend answered with its error element for the batch itself
    pub fn protocol_error(batch_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            kind: ReportKind::ProtocolError(message.into()),
        }
    }

    /// The backend could not be reached or timed out
    pub fn unreachable(batch_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            kind: ReportKind::Unreachable(message.into()),
        }
    }

    /// The backend answered with something that could not be parsed
    pub fn malformed(batch_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            kind: ReportKind::Malformed(message.into()),
        }
    }
}

/// A backend-specific vocabulary
pub trait StatusMap: Send + Sync + fmt::Debug {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Canonical status for one job report, `None` when the status is unknown
    fn map(&self, job: &JobReport) -> Option<WorkerStatus>;
}

impl StatusMapKind {
    /// The mapping table for this vocabulary
    pub fn table(self) -> &'static dyn StatusMap {
        match self {
            StatusMapKind::Boinc => &BoincStatusMap,
            StatusMapKind::ComputeVm => &ComputeVmStatusMap,
        }
    }
}

/// Result of reconciling one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    pub native_status: Option<String>,
    pub diagnostic: Option<String>,
}

impl Reconciliation {
    /// Keeps the worker where it is, recording why
    pub fn retain(worker: &Worker, diagnostic: impl Into<String>) -> Self {
        Self {
            worker_id: worker.id,
            status: worker.status(),
            native_status: worker.native_status.clone(),
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn changed(&self, worker: &Worker) -> bool {
        self.status != worker.status()
    }
}

/// Maps backend reports onto the canonical state machine with one table
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    table: &'static dyn StatusMap,
}

impl Reconciler {
    pub fn new(table: &'static dyn StatusMap) -> Self {
        Self { table }
    }

    pub fn for_kind(kind: StatusMapKind) -> Self {
        Self::new(kind.table())
    }

    /// Computes the new status of `worker` given `report`
    ///
    /// Never moves a worker backwards. Unreachable backends and reports that
    /// cannot be interpreted leave the status untouched with a diagnostic.
    pub fn reconcile(&self, worker: &Worker, report: &BackendStatusReport) -> Reconciliation {
        let current = worker.status();

        if !current.is_in_flight() {
            return Reconciliation::retain(
                worker,
                format!("worker {} is {} and has nothing to reconcile", worker.id, current),
            );
        }

        if worker.batch_id().map(|b| b.as_str()) != Some(report.batch_id.as_str()) {
            return self.unparseable(
                worker,
                report,
                format!(
                    "report for batch {} does not match worker batch {}",
                    report.batch_id,
                    worker.batch_id().map(|b| b.as_str()).unwrap_or("-")
                ),
            );
        }

        match &report.kind {
            ReportKind::Unreachable(message) => {
                warn!(
                    worker_id = %worker.id,
                    batch_id = %report.batch_id,
                    "Backend unreachable, keeping status {}: {}",
                    current,
                    message
                );
                Reconciliation::retain(
                    worker,
                    HarvesterError::TransientTransport(message.clone()).to_string(),
                )
            }
            ReportKind::Malformed(message) => self.unparseable(worker, report, message.clone()),
            ReportKind::ProtocolError(message) => {
                let diagnostic = if message.is_empty() {
                    format!("backend reported an error for batch {}", report.batch_id)
                } else {
                    message.clone()
                };
                self.advance(worker, WorkerStatus::Cancelled, None, diagnostic)
            }
            ReportKind::Batch { state, jobs } => {
                let slot = worker.batch_slot().unwrap_or(0);
                let Some(job) = jobs.get(slot) else {
                    return self.unparseable(
                        worker,
                        report,
                        format!("batch {} has no job at slot {}", report.batch_id, slot),
                    );
                };

                let Some(next) = self.table.map(job) else {
                    return self.unparseable(
                        worker,
                        report,
                        format!(
                            "unknown {} job status '{}'",
                            self.table.name(),
                            job.status()
                        ),
                    );
                };

                debug!(
                    worker_id = %worker.id,
                    batch_id = %report.batch_id,
                    "Batch state {:?}, job status '{}' -> {}",
                    state,
                    job.status(),
                    next
                );

                let native = Some(job.status().to_string());
                let diagnostic = match next {
                    WorkerStatus::Failed => job.error().map(str::to_string).unwrap_or_else(|| {
                        format!(
                            "job {} of batch {} reported '{}'",
                            slot,
                            report.batch_id,
                            job.status()
                        )
                    }),
                    WorkerStatus::Finished => {
                        format!("job {} of batch {} completed", slot, report.batch_id)
                    }
                    _ => String::new(),
                };
                self.advance(worker, next, native, diagnostic)
            }
        }
    }

    fn advance(
        &self,
        worker: &Worker,
        next: WorkerStatus,
        native_status: Option<String>,
        diagnostic: String,
    ) -> Reconciliation {
        let current = worker.status();
        let native_status = native_status.or_else(|| worker.native_status.clone());
        let diagnostic = (!diagnostic.is_empty()).then_some(diagnostic);

        if next == current {
            return Reconciliation {
                worker_id: worker.id,
                status: current,
                native_status,
                diagnostic,
            };
        }

        if !current.can_transition_to(next) {
            warn!(
                worker_id = %worker.id,
                "Ignoring backwards report {} -> {}",
                current,
                next
            );
            return Reconciliation {
                worker_id: worker.id,
                status: current,
                native_status,
                diagnostic: Some(format!("ignored report moving {} back to {}", current, next)),
            };
        }

        Reconciliation {
            worker_id: worker.id,
            status: next,
            native_status,
            diagnostic,
        }
    }

    fn unparseable(
        &self,
        worker: &Worker,
        report: &BackendStatusReport,
        message: String,
    ) -> Reconciliation {
        warn!(
            worker_id = %worker.id,
            batch_id = %report.batch_id,
            "Unparseable status report, keeping status {}: {}",
            worker.status(),
            message
        );
        Reconciliation::retain(
            worker,
            HarvesterError::UnparseableStatusReport(message).to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::submission::SubmissionResult;
    use crate::domain::worker::BatchId;

    fn in_flight(status: WorkerStatus) -> Worker {
        let mut worker = Worker::new(WorkerId(1), "BOINC_BACKFILL", 1);
        worker
            .apply_submission(&SubmissionResult::success(BatchId::new("17")), 0)
            .unwrap();
        if status == WorkerStatus::Running {
            worker.transition(WorkerStatus::Running, None).unwrap();
        }
        worker
    }

    fn boinc() -> Reconciler {
        Reconciler::for_kind(StatusMapKind::Boinc)
    }

    fn job_report(status: &str) -> BackendStatusReport {
        BackendStatusReport::batch("17", Some("1".to_string()), vec![JobReport::new(status)])
    }

    #[test]
    fn test_boinc_vocabulary() {
        let worker = in_flight(WorkerStatus::Submitted);
        let cases = [
            ("queued", WorkerStatus::Submitted),
            ("in_progress", WorkerStatus::Running),
            ("error", WorkerStatus::Failed),
            ("done", WorkerStatus::Finished),
        ];
        for (native, expected) in cases {
            let result = boinc().reconcile(&worker, &job_report(native));
            assert_eq!(result.status, expected, "{native}");
            assert_eq!(result.native_status.as_deref(), Some(native));
        }
    }

    #[test]
    fn test_batch_level_error_cancels() {
        let worker = in_flight(WorkerStatus::Running);
        let report = BackendStatusReport::protocol_error("17", "no such batch");
        let result = boinc().reconcile(&worker, &report);
        assert_eq!(result.status, WorkerStatus::Cancelled);
        assert_eq!(result.diagnostic.as_deref(), Some("no such batch"));
    }

    #[test]
    fn test_malformed_report_never_regresses() {
        let worker = in_flight(WorkerStatus::Running);
        let report = BackendStatusReport::malformed("17", "unexpected end of document");
        let result = boinc().reconcile(&worker, &report);
        assert_eq!(result.status, WorkerStatus::Running);
        assert!(!result.changed(&worker));
        assert!(
            result
                .diagnostic
                .unwrap()
                .starts_with("unparseable status report")
        );
    }

    #[test]
    fn test_report_for_other_batch_is_unparseable() {
        let worker = in_flight(WorkerStatus::Submitted);
        let report =
            BackendStatusReport::batch("18", Some("1".to_string()), vec![JobReport::new("done")]);
        let result = boinc().reconcile(&worker, &report);
        assert_eq!(result.status, WorkerStatus::Submitted);
        assert!(!result.changed(&worker));
        assert!(result.diagnostic.unwrap().contains("batch 18"));
    }

    #[test]
    fn test_unknown_status_is_unparseable() {
        let worker = in_flight(WorkerStatus::Running);
        let result = boinc().reconcile(&worker, &job_report("paused_by_user"));
        assert_eq!(result.status, WorkerStatus::Running);
        assert!(result.diagnostic.unwrap().contains("paused_by_user"));
    }

    #[test]
    fn test_unreachable_backend_keeps_status() {
        let worker = in_flight(WorkerStatus::Submitted);
        let report = BackendStatusReport::unreachable("17", "connection refused");
        let result = boinc().reconcile(&worker, &report);
        assert_eq!(result.status, WorkerStatus::Submitted);
        assert!(result.diagnostic.unwrap().contains("connection refused"));
    }

    #[test]
    fn test_queued_after_running_is_ignored() {
        let worker = in_flight(WorkerStatus::Running);
        let result = boinc().reconcile(&worker, &job_report("queued"));
        assert_eq!(result.status, WorkerStatus::Running);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let worker = in_flight(WorkerStatus::Submitted);
        let report = job_report("in_progress");
        let first = boinc().reconcile(&worker, &report);
        let second = boinc().reconcile(&worker, &report);
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_job_slot_is_unparseable() {
        let worker = in_flight(WorkerStatus::Submitted);
        let report = BackendStatusReport::batch("17", None, Vec::new());
        let result = boinc().reconcile(&worker, &report);
        assert_eq!(result.status, WorkerStatus::Submitted);
        assert!(result.diagnostic.unwrap().contains("slot 0"));
    }

    #[test]
    fn test_terminal_outcomes_carry_diagnostics() {
        let worker = in_flight(WorkerStatus::Running);
        for native in ["error", "done"] {
            let result = boinc().reconcile(&worker, &job_report(native));
            assert!(result.status.is_terminal());
            assert!(result.diagnostic.is_some(), "{native}");
        }

        let report = BackendStatusReport::batch(
            "17",
            None,
            vec![JobReport::new("error").with_error("exit code 65")],
        );
        let result = boinc().reconcile(&worker, &report);
        assert_eq!(result.diagnostic.as_deref(), Some("exit code 65"));
    }

    #[test]
    fn test_pending_worker_is_left_alone() {
        let worker = Worker::new(WorkerId(3), "BOINC_BACKFILL", 1);
        let result = boinc().reconcile(&worker, &job_report("done"));
        assert_eq!(result.status, WorkerStatus::Pending);
    }

    #[test]
    fn test_every_transition_is_an_edge() {
        let statuses = ["queued", "in_progress", "error", "done", "bogus"];
        for start in [WorkerStatus::Submitted, WorkerStatus::Running] {
            let worker = in_flight(start);
            for native in statuses {
                let result = boinc().reconcile(&worker, &job_report(native));
                assert!(
                    result.status == start || start.can_transition_to(result.status),
                    "{start} -> {} via {native}",
                    result.status
                );
            }
        }
    }
}
