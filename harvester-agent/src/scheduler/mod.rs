//! Scheduler layer for the agent
//!
//! This layer drives the service orchestrators on a fixed interval and owns
//! the worker list between cycles.

pub mod poller;

pub use poller::{CyclePoller, CycleSummary};
