//! Scriptable collaborators for driving the orchestrators without a network

#![allow(dead_code)]

use async_trait::async_trait;
use harvester_agent::service::{BackendRegistry, CallLimits, JobBroker, QueueConfigMapper};
use harvester_client::Backend;
use harvester_core::HarvesterError;
use harvester_core::domain::artifact::ArtifactPaths;
use harvester_core::domain::batch::BatchDescription;
use harvester_core::domain::site::SiteConfig;
use harvester_core::domain::submission::SubmissionResult;
use harvester_core::domain::worker::BatchId;
use harvester_core::reconcile::{BackendStatusReport, JobReport};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the stub does when asked to submit
#[derive(Debug, Clone)]
pub enum SubmitBehavior {
    /// Accept and hand out batch ids counting up from 1000
    Accept,
    /// Reject with a backend error element
    Reject(String),
    /// Accept after a delay
    Slow(Duration),
    /// Never answer
    Hang,
    /// Panic inside the call
    Panic,
}

/// What the stub does when asked for a batch status
#[derive(Debug, Clone, Copy)]
pub enum QueryBehavior {
    /// Serve the scripted report right away
    Answer,
    /// Serve the scripted report after a delay
    Slow(Duration),
    /// Never answer
    Hang,
}

pub struct StubBackend {
    behavior: Mutex<SubmitBehavior>,
    query_behavior: Mutex<QueryBehavior>,
    next_batch: AtomicUsize,
    pub submitted: Mutex<Vec<BatchDescription>>,
    pub submit_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    reports: Mutex<HashMap<String, BackendStatusReport>>,
    archive_ok: bool,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Counts a call as in flight until dropped
struct InFlightCall<'a>(&'a StubBackend);

impl<'a> InFlightCall<'a> {
    fn enter(backend: &'a StubBackend) -> Self {
        let now = backend.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        backend.peak.fetch_max(now, Ordering::SeqCst);
        Self(backend)
    }
}

impl Drop for InFlightCall<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StubBackend {
    pub fn new(behavior: SubmitBehavior) -> Arc<Self> {
        Arc::new(Self::build(behavior, true))
    }

    pub fn without_archive(behavior: SubmitBehavior) -> Arc<Self> {
        Arc::new(Self::build(behavior, false))
    }

    fn build(behavior: SubmitBehavior, archive_ok: bool) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            query_behavior: Mutex::new(QueryBehavior::Answer),
            next_batch: AtomicUsize::new(1000),
            submitted: Mutex::new(Vec::new()),
            submit_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            reports: Mutex::new(HashMap::new()),
            archive_ok,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: SubmitBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_query_behavior(&self, behavior: QueryBehavior) {
        *self.query_behavior.lock().unwrap() = behavior;
    }

    /// Highest number of calls seen in flight at once, resetting the count
    pub fn take_peak(&self) -> usize {
        self.peak.swap(0, Ordering::SeqCst)
    }

    /// Serves a BOINC-style report with one job per status from now on
    pub fn report_jobs(&self, batch_id: &str, statuses: &[&str]) {
        let jobs = statuses.iter().map(|s| JobReport::new(*s)).collect();
        self.set_report(
            batch_id,
            BackendStatusReport::batch(batch_id, Some("1".to_string()), jobs),
        );
    }

    pub fn set_report(&self, batch_id: &str, report: BackendStatusReport) {
        self.reports
            .lock()
            .unwrap()
            .insert(batch_id.to_string(), report);
    }

    fn accept(&self, batch: &BatchDescription) -> SubmissionResult {
        self.submitted.lock().unwrap().push(batch.clone());
        let id = self.next_batch.fetch_add(1, Ordering::SeqCst);
        SubmissionResult::success(BatchId::new(id.to_string()))
    }

    pub fn submit_count(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for StubBackend {
    async fn submit(&self, batch: &BatchDescription) -> SubmissionResult {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let _call = InFlightCall::enter(self);
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            SubmitBehavior::Accept => self.accept(batch),
            SubmitBehavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                self.accept(batch)
            }
            SubmitBehavior::Reject(message) => SubmissionResult::permanent(message),
            SubmitBehavior::Hang => std::future::pending().await,
            SubmitBehavior::Panic => panic!("backend blew up"),
        }
    }

    async fn query(&self, batch_id: &BatchId) -> BackendStatusReport {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let _call = InFlightCall::enter(self);
        let behavior = *self.query_behavior.lock().unwrap();
        match behavior {
            QueryBehavior::Answer => {}
            QueryBehavior::Slow(delay) => tokio::time::sleep(delay).await,
            QueryBehavior::Hang => std::future::pending::<()>().await,
        }
        self.reports
            .lock()
            .unwrap()
            .get(batch_id.as_str())
            .cloned()
            .unwrap_or_else(|| {
                BackendStatusReport::unreachable(batch_id.as_str(), "no report scripted")
            })
    }

    async fn retrieve(
        &self,
        batch_id: &BatchId,
        destination: &Path,
    ) -> Result<ArtifactPaths, HarvesterError> {
        if !self.archive_ok {
            return Err(HarvesterError::Retrieval(format!(
                "archive of batch {} is not a valid zip file",
                batch_id
            )));
        }
        let paths = ArtifactPaths::for_batch(batch_id.as_str(), destination);
        for path in [&paths.batch_log, &paths.stdout, &paths.stderr] {
            std::fs::write(path, b"ok").map_err(|e| HarvesterError::Retrieval(e.to_string()))?;
        }
        Ok(paths)
    }
}

/// Job broker with fixed per-site capacity
pub struct StaticBroker {
    capacity: HashMap<String, u32>,
    pub calls: AtomicUsize,
}

impl StaticBroker {
    pub fn new(capacity: &[(&str, u32)]) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity
                .iter()
                .map(|(site, n)| (site.to_string(), *n))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl JobBroker for StaticBroker {
    async fn available_capacity(&self, site: &str) -> u32 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.capacity.get(site).copied().unwrap_or(0)
    }
}

pub fn site() -> SiteConfig {
    SiteConfig::boinc("http://boinc.example.org/project", "secret")
}

pub fn queues(sites: Vec<(&str, SiteConfig)>) -> Arc<QueueConfigMapper> {
    Arc::new(QueueConfigMapper::new(
        sites
            .into_iter()
            .map(|(name, site)| (name.to_string(), site))
            .collect(),
    ))
}

pub fn registry(backends: Vec<(&str, Arc<StubBackend>)>) -> Arc<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    for (name, backend) in backends {
        registry.register(name, backend);
    }
    Arc::new(registry)
}

pub fn limits() -> CallLimits {
    CallLimits {
        timeout: Duration::from_millis(50),
        max_concurrent: 4,
    }
}
