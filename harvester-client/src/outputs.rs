//! Output archive download and extraction

use harvester_core::domain::artifact::ArtifactPaths;
use harvester_core::domain::worker::BatchId;
use md5::{Digest, Md5};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::BoincClient;
use crate::error::{ClientError, Result};

impl BoincClient {
    // =============================================================================
    // Batch Outputs
    // =============================================================================

    /// URL of the zip archive holding every output file of a batch
    pub fn output_url(&self, batch_id: &BatchId) -> String {
        let digest = Md5::digest(format!("{}{}", self.authenticator, batch_id).as_bytes());
        format!(
            "{}/get_output.php?cmd=batch_files&batch_id={}&auth_str={}",
            self.base_url,
            batch_id,
            hex::encode(digest)
        )
    }

    /// Download the output archive of a batch into `destination` and unpack it
    ///
    /// The archive is saved as `<batch_id>_result.zip`; it must be a valid zip
    /// file or nothing is extracted.
    pub async fn download_outputs(
        &self,
        batch_id: &BatchId,
        destination: &Path,
    ) -> Result<ArtifactPaths> {
        let url = self.output_url(batch_id);
        debug!("Downloading outputs of batch {}", batch_id);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }
        let bytes = response.bytes().await?;

        let paths = ArtifactPaths::for_batch(batch_id.as_str(), destination);
        tokio::fs::create_dir_all(destination).await?;
        tokio::fs::write(&paths.archive, &bytes).await?;

        let archive = paths.archive.clone();
        let target = destination.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_archive(&archive, &target))
            .await
            .map_err(|e| ClientError::InternalError(format!("unpack task failed: {}", e)))??;

        info!("Outputs of batch {} unpacked to {}", batch_id, destination.display());
        Ok(paths)
    }
}

/// Verifies that `archive` is a zip file and extracts it into `destination`
pub fn unpack_archive(archive: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(destination)?;
    Ok(())
}
