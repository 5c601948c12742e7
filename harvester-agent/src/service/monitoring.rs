//! Monitoring orchestrator
//!
//! Runs once per cycle over submitted and running workers: queries the
//! backend for each one and reconciles the answer. A failure while checking
//! one worker never stops the others from being checked.

use harvester_core::domain::worker::{Worker, WorkerId, WorkerStatus};
use harvester_core::reconcile::{BackendStatusReport, Reconciliation, Reconciler};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::service::CallLimits;
use crate::service::backends::BackendRegistry;
use crate::service::queue::QueueConfigSource;

/// Polls backends and maps their answers onto worker states
pub struct MonitoringOrchestrator {
    queues: Arc<dyn QueueConfigSource>,
    backends: Arc<BackendRegistry>,
    limits: CallLimits,
}

impl MonitoringOrchestrator {
    pub fn new(
        queues: Arc<dyn QueueConfigSource>,
        backends: Arc<BackendRegistry>,
        limits: CallLimits,
    ) -> Self {
        Self {
            queues,
            backends,
            limits,
        }
    }

    /// Checks every in-flight worker once
    ///
    /// Returns one reconciliation per submitted or running worker, in input
    /// order. Workers are not modified; see [`apply_updates`].
    pub async fn check_workers(&self, workers: &[Worker]) -> Vec<Reconciliation> {
        let semaphore = Arc::new(Semaphore::new(self.limits.max_concurrent));
        let mut checks = Vec::new();

        for worker in workers.iter().filter(|w| w.status().is_in_flight()) {
            let Some(batch_id) = worker.batch_id().cloned() else {
                error!(worker_id = %worker.id, "In-flight worker without batch id");
                checks.push(Check::Done(Reconciliation::retain(
                    worker,
                    "worker is in flight but has no batch id",
                )));
                continue;
            };

            let Some(site) = self.queues.site_config(&worker.site) else {
                checks.push(Check::Done(Reconciliation::retain(
                    worker,
                    format!("no queue configuration for site '{}'", worker.site),
                )));
                continue;
            };

            let Some(backend) = self.backends.get(&worker.site) else {
                checks.push(Check::Done(Reconciliation::retain(
                    worker,
                    format!("no backend registered for site '{}'", worker.site),
                )));
                continue;
            };

            debug!(worker_id = %worker.id, "Checking batch {}", batch_id);

            let reconciler = Reconciler::for_kind(site.status_map);
            let snapshot = worker.clone();
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.limits.timeout;

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;

                let report = match tokio::time::timeout(timeout, backend.query(&batch_id)).await {
                    Ok(report) => report,
                    Err(_) => BackendStatusReport::unreachable(
                        batch_id.as_str(),
                        format!("status query timed out after {:?}", timeout),
                    ),
                };
                reconciler.reconcile(&snapshot, &report)
            });

            checks.push(Check::Pending(worker, handle));
        }

        let mut updates = Vec::with_capacity(checks.len());
        for check in checks {
            let update = match check {
                Check::Done(update) => update,
                Check::Pending(worker, handle) => match handle.await {
                    Ok(update) => update,
                    Err(e) => {
                        warn!(worker_id = %worker.id, "Status check panicked: {}", e);
                        Reconciliation::retain(worker, format!("status check failed: {}", e))
                    }
                },
            };
            updates.push(update);
        }

        updates
    }
}

enum Check<'a> {
    Done(Reconciliation),
    Pending(&'a Worker, tokio::task::JoinHandle<Reconciliation>),
}

/// Applies reconciliations to `workers`, returning how many changed status
///
/// Updates for workers that moved on in the meantime (e.g. cancelled) are
/// dropped.
pub fn apply_updates(workers: &mut [Worker], updates: &[Reconciliation]) -> usize {
    let index: HashMap<WorkerId, usize> = workers
        .iter()
        .enumerate()
        .map(|(i, w)| (w.id, i))
        .collect();
    let mut changed = 0;

    for update in updates {
        let Some(&i) = index.get(&update.worker_id) else {
            warn!(worker_id = %update.worker_id, "Update for unknown worker dropped");
            continue;
        };
        let worker = &mut workers[i];

        let before = worker.status();
        match worker.apply_reconciliation(update) {
            Ok(_) if worker.status() != before => {
                changed += 1;
                if matches!(worker.status(), WorkerStatus::Failed | WorkerStatus::Cancelled) {
                    warn!(
                        worker_id = %worker.id,
                        "Worker {} -> {}: {}",
                        before,
                        worker.status(),
                        worker.diagnostic().unwrap_or_default()
                    );
                } else {
                    info!(worker_id = %worker.id, "Worker {} -> {}", before, worker.status());
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!(worker_id = %worker.id, "Invalid reconciliation: {}", e);
                if cfg!(debug_assertions) {
                    panic!("invalid reconciliation for worker {}: {}", worker.id, e);
                }
            }
        }
    }

    changed
}
