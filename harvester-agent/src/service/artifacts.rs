//! Artifact service
//!
//! Fetches the output archive of a finished worker and publishes the
//! extracted log files under the agent's public log URL.

use harvester_core::HarvesterError;
use harvester_core::domain::artifact::ArtifactPaths;
use harvester_core::domain::worker::{LogFiles, Worker, WorkerStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::service::backends::BackendRegistry;

pub struct ArtifactService {
    backends: Arc<BackendRegistry>,
    destination: PathBuf,
    log_base_url: String,
    timeout: Duration,
}

impl ArtifactService {
    pub fn new(
        backends: Arc<BackendRegistry>,
        destination: impl Into<PathBuf>,
        log_base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            backends,
            destination: destination.into(),
            log_base_url: log_base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Downloads and unpacks the outputs of a finished worker
    ///
    /// On success the worker's log locations point at the published files.
    /// The worker's status is never changed, whether retrieval succeeds or not.
    pub async fn retrieve(&self, worker: &mut Worker) -> Result<ArtifactPaths, HarvesterError> {
        if worker.status() != WorkerStatus::Finished {
            return Err(HarvesterError::Misuse(format!(
                "cannot retrieve artifacts of worker {} in state {}",
                worker.id,
                worker.status()
            )));
        }

        let batch_id = worker.batch_id().cloned().ok_or_else(|| {
            HarvesterError::Misuse(format!("worker {} finished without a batch id", worker.id))
        })?;

        let backend = self.backends.get(&worker.site).ok_or_else(|| {
            HarvesterError::Configuration(format!(
                "no backend registered for site '{}'",
                worker.site
            ))
        })?;

        tokio::fs::create_dir_all(&self.destination)
            .await
            .map_err(|e| {
                HarvesterError::Retrieval(format!(
                    "cannot create {}: {}",
                    self.destination.display(),
                    e
                ))
            })?;

        let paths = tokio::time::timeout(
            self.timeout,
            backend.retrieve(&batch_id, &self.destination),
        )
        .await
        .map_err(|_| {
            HarvesterError::Retrieval(format!(
                "download of batch {} timed out after {:?}",
                batch_id, self.timeout
            ))
        })?
        .inspect_err(|e| warn!(worker_id = %worker.id, "Artifact retrieval failed: {}", e))?;

        worker.set_log_files(LogFiles {
            stdout: Some(self.public_url(&paths.stdout)),
            stderr: Some(self.public_url(&paths.stderr)),
            batch_log: Some(self.public_url(&paths.batch_log)),
        });

        info!(
            worker_id = %worker.id,
            "Retrieved outputs of batch {} into {}",
            batch_id,
            self.destination.display()
        );

        Ok(paths)
    }

    fn public_url(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        format!("{}/{}", self.log_base_url, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvester_core::domain::worker::WorkerId;

    fn service() -> ArtifactService {
        ArtifactService::new(
            Arc::new(BackendRegistry::new()),
            "/data/boinc/logs",
            "https://harvester.example.org/logs/",
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_public_url_uses_file_name() {
        let url = service().public_url(Path::new("/data/boinc/logs/42_result.out"));
        assert_eq!(url, "https://harvester.example.org/logs/42_result.out");
    }

    #[tokio::test]
    async fn test_retrieve_requires_finished_worker() {
        let mut worker = Worker::new(WorkerId(1), "BOINC_BACKFILL", 1);

        let err = service().retrieve(&mut worker).await.unwrap_err();
        assert!(matches!(err, HarvesterError::Misuse(_)));
        assert_eq!(worker.status(), WorkerStatus::Pending);
        assert_eq!(worker.log_files, LogFiles::default());
    }
}
