//! Backend selection per site

use anyhow::{Context, Result};
use harvester_client::{Backend, BoincClient};
use harvester_core::domain::site::{BackendKind, queue_name};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::service::queue::QueueConfigSource;

/// Maps each queue to the backend that serves it
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one client per configured queue
    pub fn from_queues(queues: &dyn QueueConfigSource, timeout: Duration) -> Result<Self> {
        let mut registry = Self::new();
        for name in queues.queue_names() {
            let Some(site) = queues.site_config(&name) else {
                continue;
            };
            let backend: Arc<dyn Backend> = match site.backend {
                BackendKind::Boinc => Arc::new(
                    BoincClient::from_site(&site, timeout)
                        .with_context(|| format!("Failed to create BOINC client for {}", name))?,
                ),
            };
            registry.register(name, backend);
        }
        Ok(registry)
    }

    pub fn register(&mut self, queue: impl Into<String>, backend: Arc<dyn Backend>) {
        self.backends.insert(queue.into(), backend);
    }

    pub fn with_backend(mut self, queue: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        self.register(queue, backend);
        self
    }

    /// Backend for `queue`; an empty name means the default backfill queue
    pub fn get(&self, queue: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(queue_name(queue)).cloned()
    }
}
