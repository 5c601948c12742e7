//! Service layer
//!
//! Services contain the per-cycle business logic of the agent. They consult
//! the external collaborators (queue configuration, job broker, backends)
//! through traits so the orchestrators can be driven by stubs in tests.

mod artifacts;
mod backends;
mod broker;
mod monitoring;
mod queue;
mod submission;

use std::time::Duration;

// Re-export traits
pub use broker::JobBroker;
pub use queue::QueueConfigSource;

// Re-export implementations
pub use artifacts::ArtifactService;
pub use backends::BackendRegistry;
pub use broker::QueueCapacityBroker;
pub use monitoring::{MonitoringOrchestrator, apply_updates};
pub use queue::QueueConfigMapper;
pub use submission::{SubmissionOrchestrator, SubmissionOutcome, apply_outcomes};

/// Bounds applied to backend calls made during one cycle
#[derive(Debug, Clone, Copy)]
pub struct CallLimits {
    /// A call that takes longer resolves as a transient failure
    pub timeout: Duration,
    /// Backend calls allowed in flight at once
    pub max_concurrent: usize,
}

impl Default for CallLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_concurrent: 4,
        }
    }
}
