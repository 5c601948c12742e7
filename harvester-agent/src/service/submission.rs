//! Submission orchestrator
//!
//! Runs once per cycle over the pending workers: checks site capacity,
//! groups workers into batches, submits them and records the outcome.

use harvester_client::Backend;
use harvester_core::HarvesterError;
use harvester_core::builder::build_batch;
use harvester_core::domain::batch::BatchDescription;
use harvester_core::domain::site::queue_name;
use harvester_core::domain::submission::SubmissionResult;
use harvester_core::domain::worker::{Worker, WorkerId, WorkerStatus};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::service::CallLimits;
use crate::service::backends::BackendRegistry;
use crate::service::broker::JobBroker;
use crate::service::queue::QueueConfigSource;

/// What happened to one worker during a submission cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub worker_id: WorkerId,
    /// Job index of the worker inside its batch
    pub slot: usize,
    pub result: SubmissionResult,
}

/// A batch submission running in the background
struct InFlight {
    workers: Vec<WorkerId>,
    handle: JoinHandle<SubmissionResult>,
}

/// Submits pending workers to their site's backend
pub struct SubmissionOrchestrator {
    queues: Arc<dyn QueueConfigSource>,
    broker: Arc<dyn JobBroker>,
    backends: Arc<BackendRegistry>,
    limits: CallLimits,
}

impl SubmissionOrchestrator {
    pub fn new(
        queues: Arc<dyn QueueConfigSource>,
        broker: Arc<dyn JobBroker>,
        backends: Arc<BackendRegistry>,
        limits: CallLimits,
    ) -> Self {
        Self {
            queues,
            broker,
            backends,
            limits,
        }
    }

    /// Submits pending workers and applies the outcomes to `workers`
    pub async fn run_cycle(&self, workers: &mut [Worker]) -> Vec<SubmissionOutcome> {
        let outcomes = self.submit_pending(workers).await;
        apply_outcomes(workers, &outcomes);
        outcomes
    }

    /// Submits pending workers without touching them
    ///
    /// Workers whose attempts are exhausted are failed without a network call.
    /// Sites with zero capacity are skipped entirely.
    pub async fn submit_pending(&self, workers: &[Worker]) -> Vec<SubmissionOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.limits.max_concurrent));
        let mut outcomes = Vec::new();
        let mut in_flight = Vec::new();

        for (site_name, mut pending) in pending_by_site(workers) {
            let Some(site) = self.queues.site_config(&site_name) else {
                let err = HarvesterError::Configuration(format!(
                    "no queue configuration for site '{}'",
                    site_name
                ));
                error!("{}", err);
                outcomes.extend(fail_all(&pending, &err));
                continue;
            };

            let max_attempts = site.max_submission_attempts;
            pending.retain(|worker| {
                if worker.submission_attempts() < max_attempts {
                    return true;
                }
                let last = worker
                    .diagnostic()
                    .map(|d| format!(" (last error: {})", d))
                    .unwrap_or_default();
                warn!(
                    worker_id = %worker.id,
                    "Submission attempts exhausted ({} of {})",
                    worker.submission_attempts(),
                    max_attempts
                );
                outcomes.push(SubmissionOutcome {
                    worker_id: worker.id,
                    slot: 0,
                    result: SubmissionResult::permanent(format!(
                        "submission attempts exhausted after {} of {} attempts{}",
                        worker.submission_attempts(),
                        max_attempts,
                        last
                    )),
                });
                false
            });

            if pending.is_empty() {
                continue;
            }

            let capacity = self.broker.available_capacity(&site_name).await as usize;
            if capacity == 0 {
                info!(
                    "No capacity at site {}, leaving {} worker(s) pending",
                    site_name,
                    pending.len()
                );
                continue;
            }

            let Some(backend) = self.backends.get(&site_name) else {
                let err = HarvesterError::Configuration(format!(
                    "no backend registered for site '{}'",
                    site_name
                ));
                error!("{}", err);
                outcomes.extend(fail_all(&pending, &err));
                continue;
            };

            pending.truncate(capacity);
            debug!(
                "Site {}: capacity {}, submitting {} worker(s) in batches of {}",
                site_name,
                capacity,
                pending.len(),
                site.jobs_per_batch
            );

            for group in pending.chunks(site.jobs_per_batch.max(1)) {
                match build_batch(group, &site) {
                    Ok(batch) => in_flight.push(self.spawn_submission(
                        Arc::clone(&backend),
                        batch,
                        group.iter().map(|w| w.id).collect(),
                        Arc::clone(&semaphore),
                    )),
                    Err(err) => {
                        error!("Failed to build batch for site {}: {}", site_name, err);
                        outcomes.extend(fail_all(group, &err));
                    }
                }
            }
        }

        for InFlight { workers, handle } in in_flight {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Submission task panicked: {}", e);
                    SubmissionResult::temporary(format!("submission task failed: {}", e))
                }
            };
            outcomes.extend(
                workers
                    .into_iter()
                    .enumerate()
                    .map(|(slot, worker_id)| SubmissionOutcome {
                        worker_id,
                        slot,
                        result: result.clone(),
                    }),
            );
        }

        outcomes
    }

    /// Spawns one bounded submission call
    fn spawn_submission(
        &self,
        backend: Arc<dyn Backend>,
        batch: BatchDescription,
        workers: Vec<WorkerId>,
        semaphore: Arc<Semaphore>,
    ) -> InFlight {
        let timeout = self.limits.timeout;

        let handle = tokio::spawn(async move {
            // Permit is automatically released when dropped
            let _permit = semaphore.acquire_owned().await;

            match tokio::time::timeout(timeout, backend.submit(&batch)).await {
                Ok(result) => result,
                Err(_) => SubmissionResult::from(HarvesterError::TransientTransport(format!(
                    "submission timed out after {:?}",
                    timeout
                ))),
            }
        });

        InFlight { workers, handle }
    }
}

/// Applies submission outcomes, discarding late results for workers that
/// left the pending state in the meantime
pub fn apply_outcomes(workers: &mut [Worker], outcomes: &[SubmissionOutcome]) {
    let index: HashMap<WorkerId, usize> = workers
        .iter()
        .enumerate()
        .map(|(i, w)| (w.id, i))
        .collect();

    for outcome in outcomes {
        let Some(&i) = index.get(&outcome.worker_id) else {
            warn!(worker_id = %outcome.worker_id, "Outcome for unknown worker dropped");
            continue;
        };
        let worker = &mut workers[i];

        match worker.apply_submission(&outcome.result, outcome.slot) {
            Ok(true) => match worker.status() {
                WorkerStatus::Submitted => info!(
                    worker_id = %worker.id,
                    "Worker submitted as batch {}",
                    worker.batch_id().map(|b| b.as_str()).unwrap_or_default()
                ),
                WorkerStatus::Failed => warn!(
                    worker_id = %worker.id,
                    "Worker failed: {}",
                    worker.diagnostic().unwrap_or_default()
                ),
                _ => debug!(
                    worker_id = %worker.id,
                    "Submission will be retried (attempt {})",
                    worker.submission_attempts()
                ),
            },
            Ok(false) => {}
            Err(e) => {
                error!(worker_id = %worker.id, "Invalid submission transition: {}", e);
                if cfg!(debug_assertions) {
                    panic!("invalid submission transition for worker {}: {}", worker.id, e);
                }
            }
        }
    }
}

/// Pending workers grouped by queue, each group ordered by worker id
///
/// Workers without a site land in the default queue's group so they share
/// its capacity.
fn pending_by_site(workers: &[Worker]) -> BTreeMap<String, Vec<&Worker>> {
    let mut sites: BTreeMap<String, Vec<&Worker>> = BTreeMap::new();
    for worker in workers
        .iter()
        .filter(|w| w.status() == WorkerStatus::Pending)
    {
        sites
            .entry(queue_name(&worker.site).to_string())
            .or_default()
            .push(worker);
    }
    for group in sites.values_mut() {
        group.sort_by_key(|w| w.id);
    }
    sites
}

fn fail_all(workers: &[&Worker], err: &HarvesterError) -> Vec<SubmissionOutcome> {
    workers
        .iter()
        .enumerate()
        .map(|(slot, worker)| SubmissionOutcome {
            worker_id: worker.id,
            slot,
            result: SubmissionResult::from(err.clone()),
        })
        .collect()
}
