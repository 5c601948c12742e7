//! Batch builder
//!
//! Turns workers plus static site configuration into a [`BatchDescription`].
//!
//! Grouping policy: every worker becomes exactly one job, in the order the
//! workers are given. Each job carries the site's shared inputs (in configured
//! order) followed by the remote inputs of the worker's own jobs.

use std::fs;
use tracing::debug;

use crate::domain::batch::{BatchDescription, FileDescription, FileMode, JobDescription};
use crate::domain::site::{SharedInput, SiteConfig};
use crate::domain::worker::Worker;
use crate::error::{HarvesterError, Result};

/// Builds one batch for `workers`, all destined for the same site
///
/// Shared inline inputs are read from disk on every call, so a renewed
/// credential is picked up by the next submission.
pub fn build_batch(workers: &[&Worker], site: &SiteConfig) -> Result<BatchDescription> {
    let Some(first) = workers.first() else {
        return Err(HarvesterError::EmptyBatch);
    };

    if let Some(stray) = workers.iter().find(|w| w.site != first.site) {
        return Err(HarvesterError::Misuse(format!(
            "worker {} targets site '{}' but the batch is for '{}'",
            stray.id, stray.site, first.site
        )));
    }

    let shared = site
        .shared_inputs
        .iter()
        .map(load_shared_input)
        .collect::<Result<Vec<_>>>()?;

    let jobs = workers
        .iter()
        .map(|worker| {
            let mut files = shared.clone();
            files.extend(
                worker
                    .jobs()
                    .iter()
                    .flat_map(|job| job.input_files.iter())
                    .map(|source| FileDescription::Reference {
                        source: source.clone(),
                    }),
            );

            JobDescription {
                files,
                fpops_est: site.fpops_est,
                command_line: site.command_line.clone(),
            }
        })
        .collect::<Vec<_>>();

    debug!(
        "Built batch '{}' with {} job(s) and {} shared input(s)",
        site.batch_name,
        jobs.len(),
        shared.len()
    );

    Ok(BatchDescription {
        app_name: site.app_name.clone(),
        batch_name: site.batch_name.clone(),
        input_template: site.input_template.clone(),
        output_template: site.output_template.clone(),
        jobs,
    })
}

fn load_shared_input(input: &SharedInput) -> Result<FileDescription> {
    match input.mode {
        FileMode::Inline => {
            let content = fs::read_to_string(&input.path).map_err(|e| {
                HarvesterError::Configuration(format!(
                    "cannot read shared input {}: {}",
                    input.path.display(),
                    e
                ))
            })?;
            Ok(FileDescription::Inline { content })
        }
        FileMode::Reference => Ok(FileDescription::Reference {
            source: input.path.display().to_string(),
        }),
    }
}
