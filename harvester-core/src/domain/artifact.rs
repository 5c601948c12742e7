//! Artifact paths produced by a finished batch

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Suffix appended to the batch id to name the downloaded archive
pub const ARCHIVE_SUFFIX: &str = "_result.zip";

/// The three companion files extracted from a batch archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub archive: PathBuf,
    pub batch_log: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl ArtifactPaths {
    /// Derives all paths for `batch_id` inside `destination`
    ///
    /// `<dest>/<id>_result.zip` unpacks to `<id>_result.log`, `.out` and `.err`.
    pub fn for_batch(batch_id: &str, destination: &Path) -> Self {
        let archive = destination.join(format!("{}{}", batch_id, ARCHIVE_SUFFIX));
        Self {
            batch_log: archive.with_extension("log"),
            stdout: archive.with_extension("out"),
            stderr: archive.with_extension("err"),
            archive,
        }
    }
}
