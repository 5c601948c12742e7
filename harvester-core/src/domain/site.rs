//! Site configuration
//!
//! Immutable per-queue settings handed to the batch builder and the backend
//! client at construction time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::batch::FileMode;

/// Queue used when a worker names no site
pub const DEFAULT_QUEUE: &str = "BOINC_BACKFILL";

/// Queue a site name resolves to; an empty name means [`DEFAULT_QUEUE`]
pub fn queue_name(site: &str) -> &str {
    if site.is_empty() { DEFAULT_QUEUE } else { site }
}

/// Backend implementation serving a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Boinc,
}

/// Status vocabulary spoken by a site's backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusMapKind {
    #[default]
    Boinc,
    ComputeVm,
}

/// A file shipped with every job of a site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedInput {
    pub path: PathBuf,
    #[serde(default = "default_file_mode")]
    pub mode: FileMode,
}

/// Settings of one queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub status_map: StatusMapKind,
    pub project_url: String,
    pub authenticator: String,
    pub app_name: String,
    pub batch_name: String,
    #[serde(default)]
    pub input_template: Option<String>,
    #[serde(default)]
    pub output_template: Option<String>,
    /// Credential, bootstrap script and other files every job receives, in order
    #[serde(default)]
    pub shared_inputs: Vec<SharedInput>,
    pub command_line: String,
    #[serde(default = "default_fpops_est")]
    pub fpops_est: f64,
    #[serde(default = "default_one")]
    pub jobs_per_batch: usize,
    #[serde(default = "default_one_u32")]
    pub max_workers: u32,
    #[serde(default = "default_max_attempts")]
    pub max_submission_attempts: u32,
    #[serde(default = "default_one_u32")]
    pub n_core: u32,
}

fn default_file_mode() -> FileMode {
    FileMode::Inline
}

fn default_fpops_est() -> f64 {
    1e6
}

fn default_one() -> usize {
    1
}

fn default_one_u32() -> u32 {
    1
}

fn default_max_attempts() -> u32 {
    3
}

impl SiteConfig {
    /// Minimal BOINC site, mostly useful for tests
    pub fn boinc(project_url: impl Into<String>, authenticator: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Boinc,
            status_map: StatusMapKind::Boinc,
            project_url: project_url.into(),
            authenticator: authenticator.into(),
            app_name: "ATLAS_backfill".to_string(),
            batch_name: "harvester".to_string(),
            input_template: None,
            output_template: None,
            shared_inputs: Vec::new(),
            command_line: "BOINC BOINC_BACKFILL".to_string(),
            fpops_est: default_fpops_est(),
            jobs_per_batch: 1,
            max_workers: 1,
            max_submission_attempts: default_max_attempts(),
            n_core: 1,
        }
    }

    /// Checks values that serde cannot
    pub fn validate(&self) -> crate::Result<()> {
        if !self.project_url.starts_with("http://") && !self.project_url.starts_with("https://") {
            return Err(crate::HarvesterError::Configuration(format!(
                "project_url must start with http:// or https://, got '{}'",
                self.project_url
            )));
        }
        if self.jobs_per_batch == 0 {
            return Err(crate::HarvesterError::Configuration(
                "jobs_per_batch must be greater than 0".to_string(),
            ));
        }
        if self.max_submission_attempts == 0 {
            return Err(crate::HarvesterError::Configuration(
                "max_submission_attempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
