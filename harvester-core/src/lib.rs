//! Harvester Core
//!
//! Core types and pure logic for submitting workers to remote batch backends
//! and reconciling their status.
//!
//! This crate contains:
//! - Domain types: workers, batch descriptions, submission results, site configuration
//! - The batch builder that turns workers into a backend submission payload
//! - Status mapping tables and the reconciler that folds backend reports into
//!   the canonical worker state machine
//!
//! Network transport lives in `harvester-client`, orchestration in `harvester-agent`.

pub mod builder;
pub mod domain;
pub mod error;
pub mod reconcile;

pub use error::{HarvesterError, Result};
