//! Harvester backend client
//!
//! The [`Backend`] capability is what the orchestrators talk to: submit a
//! batch, query its status, retrieve its output artifacts. Each backend
//! implementation owns its wire format and its own status report.
//!
//! [`BoincClient`] implements it for the BOINC remote job submission API.
//!
//! # Example
//!
//! ```no_run
//! use harvester_client::{Backend, BoincClient};
//! use harvester_core::domain::worker::BatchId;
//!
//! # async fn example() {
//! let client = BoincClient::new("http://atlasathome.cern.ch/Atlas-test/", "authenticator");
//! let report = client.query(&BatchId::new("1234")).await;
//! # }
//! ```

pub mod error;
mod batches;
mod outputs;
pub mod xml;

pub use error::{ClientError, Result};
pub use outputs::unpack_archive;

use async_trait::async_trait;
use harvester_core::HarvesterError;
use harvester_core::domain::artifact::ArtifactPaths;
use harvester_core::domain::batch::BatchDescription;
use harvester_core::domain::site::SiteConfig;
use harvester_core::domain::submission::SubmissionResult;
use harvester_core::domain::worker::BatchId;
use harvester_core::reconcile::BackendStatusReport;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// A remote execution backend
///
/// Implementations never surface raw transport errors: `submit` folds them
/// into a [`SubmissionResult`] and `query` into a [`BackendStatusReport`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Submits one batch; one network round trip
    async fn submit(&self, batch: &BatchDescription) -> SubmissionResult;

    /// Fetches the current status of a batch returned by a successful `submit`
    async fn query(&self, batch_id: &BatchId) -> BackendStatusReport;

    /// Downloads and unpacks the output archive of a finished batch
    async fn retrieve(
        &self,
        batch_id: &BatchId,
        destination: &Path,
    ) -> std::result::Result<ArtifactPaths, HarvesterError>;
}

/// HTTP client for a BOINC project's remote job submission API
#[derive(Debug, Clone)]
pub struct BoincClient {
    /// Project URL without trailing slash (e.g., "http://atlasathome.cern.ch/Atlas-test")
    base_url: String,
    /// Account authenticator sent with every request
    authenticator: String,
    /// HTTP client instance
    client: Client,
}

impl BoincClient {
    /// Create a new client with a default HTTP client
    pub fn new(project_url: impl Into<String>, authenticator: impl Into<String>) -> Self {
        Self::with_client(project_url, authenticator, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(
        project_url: impl Into<String>,
        authenticator: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = project_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            authenticator: authenticator.into(),
            client,
        }
    }

    /// Create a client for a site, bounding every call by `timeout`
    pub fn from_site(site: &SiteConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(
            site.project_url.clone(),
            site.authenticator.clone(),
            client,
        ))
    }

    /// Get the project URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Posts a request document to the RPC handler and parses the answer
    async fn post_request(&self, request: String) -> Result<xml::Element> {
        let url = format!("{}/submit_rpc_handler.php", self.base_url);
        let response = self
            .client
            .post(&url)
            .form(&[("request", request)])
            .send()
            .await?;

        let body = self.handle_text_response(response).await?;
        xml::parse(&body)
    }

    /// Checks the status code and returns the body as text
    async fn handle_text_response(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl Backend for BoincClient {
    async fn submit(&self, batch: &BatchDescription) -> SubmissionResult {
        match self.submit_batch(batch).await {
            Ok(batch_id) => {
                info!("Batch submitted with id: {}", batch_id);
                SubmissionResult::success(batch_id)
            }
            Err(ClientError::Backend(message)) => {
                warn!("Backend rejected batch '{}': {}", batch.batch_name, message);
                SubmissionResult::permanent(message)
            }
            Err(e) => {
                warn!("Failed to submit batch '{}': {}", batch.batch_name, e);
                HarvesterError::from(e).into()
            }
        }
    }

    async fn query(&self, batch_id: &BatchId) -> BackendStatusReport {
        match self.query_batch(batch_id).await {
            Ok(report) => report,
            Err(e @ ClientError::ParseError(_)) => {
                BackendStatusReport::malformed(batch_id.as_str(), e.to_string())
            }
            Err(e) => BackendStatusReport::unreachable(batch_id.as_str(), e.to_string()),
        }
    }

    async fn retrieve(
        &self,
        batch_id: &BatchId,
        destination: &Path,
    ) -> std::result::Result<ArtifactPaths, HarvesterError> {
        self.download_outputs(batch_id, destination)
            .await
            .map_err(|e| HarvesterError::Retrieval(e.to_string()))
    }
}
