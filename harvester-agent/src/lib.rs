//! Harvester Agent
//!
//! Drives workers through a remote batch backend once per polling cycle.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Services: Submission and monitoring orchestrators, artifact retrieval,
//!   and the collaborators they consult (queue configuration, job broker, backends)
//! - Scheduler: The polling loop that owns the worker list

pub mod config;
pub mod scheduler;
pub mod service;
