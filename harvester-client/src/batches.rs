//! Batch submission and status endpoints

use harvester_core::domain::batch::BatchDescription;
use harvester_core::domain::worker::BatchId;
use harvester_core::reconcile::{BackendStatusReport, JobReport};
use tracing::debug;

use crate::BoincClient;
use crate::error::{ClientError, Result};
use crate::xml::{self, Element};

impl BoincClient {
    // =============================================================================
    // Batch Lifecycle
    // =============================================================================

    /// Submit a batch and return the identifier the project assigned
    ///
    /// A response carrying the error element becomes [`ClientError::Backend`]
    /// with the project's message verbatim.
    pub async fn submit_batch(&self, batch: &BatchDescription) -> Result<BatchId> {
        debug!(
            "Submitting batch '{}' with {} job(s)",
            batch.batch_name,
            batch.jobs.len()
        );
        let request = xml::submit_batch_request(&self.authenticator, batch);
        let root = self.post_request(request).await?;

        if let Some(message) = root.error_message() {
            return Err(ClientError::Backend(message));
        }

        let id = if root.name == "batch_id" {
            Some(root.text.as_str())
        } else {
            root.child_text("batch_id")
        };

        match id.map(str::trim) {
            Some(id) if !id.is_empty() => Ok(BatchId::new(id)),
            _ => Err(ClientError::MissingElement("batch_id".to_string())),
        }
    }

    /// Query a batch with per-job details
    ///
    /// Transport failures are returned as errors; everything the project
    /// answered is folded into the report.
    pub async fn query_batch(&self, batch_id: &BatchId) -> Result<BackendStatusReport> {
        let request = xml::query_batch_request(&self.authenticator, batch_id);
        let root = self.post_request(request).await?;
        Ok(status_report(batch_id, &root))
    }
}

/// Converts a `query_batch` response into a status report
pub(crate) fn status_report(batch_id: &BatchId, root: &Element) -> BackendStatusReport {
    if let Some(message) = root.error_message() {
        return BackendStatusReport::protocol_error(batch_id.as_str(), message);
    }

    let batch = if root.name == "batch" {
        root
    } else {
        match root.child("batch") {
            Some(batch) => batch,
            None => {
                return BackendStatusReport::malformed(
                    batch_id.as_str(),
                    format!("expected <batch>, got <{}>", root.name),
                );
            }
        }
    };

    let state = batch.child_text("state").map(|s| s.trim().to_string());
    let jobs = batch
        .children_named("job")
        .map(|job| job.child_text("status").map(|s| JobReport::new(s.trim())))
        .collect::<Option<Vec<_>>>();

    match jobs {
        Some(jobs) => BackendStatusReport::batch(batch_id.as_str(), state, jobs),
        None => BackendStatusReport::malformed(batch_id.as_str(), "job without <status>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvester_core::domain::site::StatusMapKind;
    use harvester_core::domain::submission::SubmissionResult;
    use harvester_core::domain::worker::{Worker, WorkerId, WorkerStatus};
    use harvester_core::reconcile::Reconciler;

    fn submitted_worker() -> Worker {
        let mut worker = Worker::new(WorkerId(1), "BOINC_BACKFILL", 1);
        worker
            .apply_submission(&SubmissionResult::success(BatchId::new("55")), 0)
            .unwrap();
        worker
    }

    fn reconcile(document: &str) -> WorkerStatus {
        let root = xml::parse(document).unwrap();
        let report = status_report(&BatchId::new("55"), &root);
        Reconciler::for_kind(StatusMapKind::Boinc)
            .reconcile(&submitted_worker(), &report)
            .status
    }

    #[test]
    fn test_batch_response_is_mapped() {
        let document = "<batch><id>55</id><state>1</state>\
            <job><id>9</id><status>in_progress</status></job></batch>";
        assert_eq!(reconcile(document), WorkerStatus::Running);
    }

    #[test]
    fn test_wrapped_batch_response_is_mapped() {
        let document = "<query_batch><batch><state>2</state>\
            <job><status>done</status></job></batch></query_batch>";
        assert_eq!(reconcile(document), WorkerStatus::Finished);
    }

    #[test]
    fn test_error_response_cancels() {
        let document = "<error><error_msg>batch 55 not found</error_msg></error>";
        assert_eq!(reconcile(document), WorkerStatus::Cancelled);
    }

    #[test]
    fn test_job_without_status_keeps_state() {
        let document = "<batch><state>1</state><job><id>9</id></job></batch>";
        assert_eq!(reconcile(document), WorkerStatus::Submitted);
    }

    #[test]
    fn test_unexpected_root_keeps_state() {
        assert_eq!(reconcile("<html><body>oops</body></html>"), WorkerStatus::Submitted);
    }
}
