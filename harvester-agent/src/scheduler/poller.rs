//! Cycle poller
//!
//! Runs one submission and monitoring cycle per poll interval. Each cycle
//! tops up backfill workers, submits pending ones, reconciles in-flight ones,
//! fetches outputs of newly finished ones and archives terminal ones.

use anyhow::Result;
use harvester_core::domain::site::queue_name;
use harvester_core::domain::worker::{Worker, WorkerId, WorkerStatus};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::service::{
    ArtifactService, BackendRegistry, JobBroker, MonitoringOrchestrator, QueueConfigSource,
    SubmissionOrchestrator, apply_updates,
};

/// Counters for one poll cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub created: usize,
    pub submitted: usize,
    pub updated: usize,
    pub retrieved: usize,
    pub archived: usize,
}

/// Owns the worker list and drives the orchestrators over it
pub struct CyclePoller {
    config: Config,
    queues: Arc<dyn QueueConfigSource>,
    broker: Arc<dyn JobBroker>,
    submission: SubmissionOrchestrator,
    monitoring: MonitoringOrchestrator,
    artifacts: ArtifactService,
    workers: Vec<Worker>,
    next_id: u64,
}

impl CyclePoller {
    pub fn new(
        config: Config,
        queues: Arc<dyn QueueConfigSource>,
        broker: Arc<dyn JobBroker>,
        backends: Arc<BackendRegistry>,
    ) -> Self {
        let limits = config.call_limits();
        let submission = SubmissionOrchestrator::new(
            Arc::clone(&queues),
            Arc::clone(&broker),
            Arc::clone(&backends),
            limits,
        );
        let monitoring =
            MonitoringOrchestrator::new(Arc::clone(&queues), Arc::clone(&backends), limits);
        let artifacts = ArtifactService::new(
            backends,
            config.artifact_dir.clone(),
            config.log_base_url.clone(),
            config.call_timeout,
        );

        Self {
            config,
            queues,
            broker,
            submission,
            monitoring,
            artifacts,
            workers: Vec::new(),
            next_id: 1,
        }
    }

    /// Workers currently tracked by the agent
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Starts the polling loop and stops on Ctrl-C
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs cycles until `shutdown` resolves, then cancels unfinished workers
    pub async fn run_until(&mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!(
            "Starting cycle poller {} (interval: {:?})",
            self.config.harvester_id, self.config.poll_interval
        );

        let mut interval = time::interval(self.config.poll_interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let summary = self.run_cycle().await;
                    if summary != CycleSummary::default() {
                        info!("Cycle finished: {:?}", summary);
                    } else {
                        debug!("Nothing to do this cycle");
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        let cancelled = self.cancel_unfinished("agent shutting down");
        info!("Cancelled {} unfinished worker(s)", cancelled);

        Ok(())
    }

    /// Performs a single poll cycle
    pub async fn run_cycle(&mut self) -> CycleSummary {
        let mut summary = CycleSummary {
            created: self.top_up().await,
            ..CycleSummary::default()
        };

        let outcomes = self.submission.run_cycle(&mut self.workers).await;
        summary.submitted = outcomes.iter().filter(|o| o.result.is_success()).count();

        let updates = self.monitoring.check_workers(&self.workers).await;
        let finished_before: HashSet<WorkerId> = self
            .workers
            .iter()
            .filter(|w| w.status() == WorkerStatus::Finished)
            .map(|w| w.id)
            .collect();
        summary.updated = apply_updates(&mut self.workers, &updates);

        for worker in self.workers.iter_mut().filter(|w| {
            w.status() == WorkerStatus::Finished && !finished_before.contains(&w.id)
        }) {
            match self.artifacts.retrieve(worker).await {
                Ok(_) => summary.retrieved += 1,
                Err(e) => warn!(worker_id = %worker.id, "Outputs not retrieved: {}", e),
            }
        }

        summary.archived = self.archive_terminal();
        summary
    }

    /// Cancels every pending or submitted worker, returning how many were cancelled
    pub fn cancel_unfinished(&mut self, reason: &str) -> usize {
        let mut cancelled = 0;
        for worker in self.workers.iter_mut().filter(|w| {
            matches!(w.status(), WorkerStatus::Pending | WorkerStatus::Submitted)
        }) {
            match worker.cancel(reason) {
                Ok(()) => cancelled += 1,
                Err(e) => error!(worker_id = %worker.id, "Failed to cancel worker: {}", e),
            }
        }
        cancelled
    }

    /// Adds one pending worker per queue that has room and none pending
    async fn top_up(&mut self) -> usize {
        let mut created = 0;

        for queue in self.queues.queue_names() {
            let Some(site) = self.queues.site_config(&queue) else {
                continue;
            };

            let capacity = self.broker.available_capacity(&queue).await as usize;
            let on_site = || {
                self.workers
                    .iter()
                    .filter(|w| queue_name(&w.site) == queue.as_str())
            };
            let pending = on_site()
                .filter(|w| w.status() == WorkerStatus::Pending)
                .count();
            let active = on_site().filter(|w| !w.status().is_terminal()).count();

            if capacity == 0 || pending > 0 || active >= capacity {
                continue;
            }

            let worker = Worker::new(WorkerId(self.next_id), queue.as_str(), site.n_core);
            self.next_id += 1;
            debug!(worker_id = %worker.id, "Created backfill worker for {}", queue);
            self.workers.push(worker);
            created += 1;
        }

        created
    }

    /// Drops terminal workers from the list
    fn archive_terminal(&mut self) -> usize {
        let before = self.workers.len();
        self.workers.retain(|worker| {
            if !worker.status().is_terminal() {
                return true;
            }
            info!(
                worker_id = %worker.id,
                site = %worker.site,
                "Archiving {} worker (batch {}): {}",
                worker.status(),
                worker.batch_id().map(|b| b.as_str()).unwrap_or("-"),
                worker.diagnostic().unwrap_or_default()
            );
            false
        });
        before - self.workers.len()
    }
}
