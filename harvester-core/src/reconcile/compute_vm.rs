use super::{JobReport, StatusMap};
use crate::domain::worker::WorkerStatus;

/// Instance lifecycle vocabulary of cloud compute VMs
///
/// One worker maps to one instance. An instance that stops without an error
/// is considered finished.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeVmStatusMap;

impl StatusMap for ComputeVmStatusMap {
    fn name(&self) -> &'static str {
        "compute_vm"
    }

    fn map(&self, job: &JobReport) -> Option<WorkerStatus> {
        if job.error().is_some() {
            return Some(WorkerStatus::Failed);
        }
        match job.status() {
            "PROVISIONING" | "STAGING" => Some(WorkerStatus::Submitted),
            "RUNNING" => Some(WorkerStatus::Running),
            "STOPPING" | "SUSPENDED" | "TERMINATED" => Some(WorkerStatus::Finished),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_states() {
        let map = ComputeVmStatusMap;
        assert_eq!(map.map(&JobReport::new("STAGING")), Some(WorkerStatus::Submitted));
        assert_eq!(map.map(&JobReport::new("RUNNING")), Some(WorkerStatus::Running));
        assert_eq!(map.map(&JobReport::new("TERMINATED")), Some(WorkerStatus::Finished));
        assert_eq!(map.map(&JobReport::new("REPAIRING")), None);
    }

    #[test]
    fn test_error_wins_over_status() {
        let job = JobReport::new("TERMINATED").with_error("ZONE_RESOURCE_POOL_EXHAUSTED");
        assert_eq!(ComputeVmStatusMap.map(&job), Some(WorkerStatus::Failed));
    }
}
