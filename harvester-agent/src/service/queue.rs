//! Queue configuration
//!
//! Read-only lookup of site settings by queue name, loaded once at startup.

use anyhow::{Context, Result};
use harvester_core::domain::site::{SiteConfig, queue_name};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Source of immutable per-queue settings
pub trait QueueConfigSource: Send + Sync {
    /// Settings for `queue`; an empty name means the default backfill queue
    fn site_config(&self, queue: &str) -> Option<Arc<SiteConfig>>;

    /// All configured queue names, sorted
    fn queue_names(&self) -> Vec<String>;
}

/// Queue configuration backed by a JSON document
#[derive(Debug, Clone, Default)]
pub struct QueueConfigMapper {
    queues: HashMap<String, Arc<SiteConfig>>,
}

impl QueueConfigMapper {
    pub fn new(queues: HashMap<String, SiteConfig>) -> Self {
        Self {
            queues: queues
                .into_iter()
                .map(|(name, site)| (name, Arc::new(site)))
                .collect(),
        }
    }

    /// Parses and validates a `{ "<queue>": { ...site... } }` document
    pub fn from_json(json: &str) -> Result<Self> {
        let queues: HashMap<String, SiteConfig> =
            serde_json::from_str(json).context("Failed to parse queue configuration")?;

        for (name, site) in &queues {
            site.validate()
                .with_context(|| format!("Invalid configuration for queue {}", name))?;
        }

        Ok(Self::new(queues))
    }

    /// Loads the queue configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read queue configuration {}", path.display()))?;
        let mapper = Self::from_json(&json)?;
        info!(
            "Loaded {} queue(s) from {}",
            mapper.queues.len(),
            path.display()
        );
        Ok(mapper)
    }
}

impl QueueConfigSource for QueueConfigMapper {
    fn site_config(&self, queue: &str) -> Option<Arc<SiteConfig>> {
        self.queues.get(queue_name(queue)).cloned()
    }

    fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.keys().cloned().collect();
        names.sort();
        names
    }
}
