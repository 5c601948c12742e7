//! Job broker collaborator
//!
//! Tells the submission orchestrator how many workers a site may receive
//! this cycle. Zero means submit nothing.

use async_trait::async_trait;
use std::sync::Arc;

use crate::service::queue::QueueConfigSource;

/// Source of per-site submission capacity
#[async_trait]
pub trait JobBroker: Send + Sync {
    async fn available_capacity(&self, site: &str) -> u32;
}

/// Grants each site its configured `max_workers`
pub struct QueueCapacityBroker {
    queues: Arc<dyn QueueConfigSource>,
}

impl QueueCapacityBroker {
    pub fn new(queues: Arc<dyn QueueConfigSource>) -> Self {
        Self { queues }
    }
}

#[async_trait]
impl JobBroker for QueueCapacityBroker {
    async fn available_capacity(&self, site: &str) -> u32 {
        self.queues
            .site_config(site)
            .map(|site| site.max_workers)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::QueueConfigMapper;
    use harvester_core::domain::site::SiteConfig;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_capacity_follows_max_workers() {
        let mut site = SiteConfig::boinc("http://boinc.example.org/", "a");
        site.max_workers = 5;
        let queues = QueueConfigMapper::new(HashMap::from([("BOINC_BACKFILL".to_string(), site)]));
        let broker = QueueCapacityBroker::new(Arc::new(queues));

        assert_eq!(broker.available_capacity("BOINC_BACKFILL").await, 5);
        assert_eq!(broker.available_capacity("").await, 5);
        assert_eq!(broker.available_capacity("ELSEWHERE").await, 0);
    }
}
