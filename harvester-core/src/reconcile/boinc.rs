use super::{JobReport, StatusMap};
use crate::domain::worker::WorkerStatus;

/// Job status vocabulary of the BOINC remote job submission API
#[derive(Debug, Clone, Copy, Default)]
pub struct BoincStatusMap;

impl StatusMap for BoincStatusMap {
    fn name(&self) -> &'static str {
        "boinc"
    }

    fn map(&self, job: &JobReport) -> Option<WorkerStatus> {
        match job.status() {
            "queued" => Some(WorkerStatus::Submitted),
            "in_progress" => Some(WorkerStatus::Running),
            "error" => Some(WorkerStatus::Failed),
            "done" => Some(WorkerStatus::Finished),
            _ => None,
        }
    }
}
