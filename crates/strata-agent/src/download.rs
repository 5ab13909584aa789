//! HTTP client for the tablet file service of peer backends.
//!
//! Listing and download share one URL shape; a directory URL (trailing
//! `/`) returns a newline-separated file list, a file URL streams the
//! body, and `HEAD` serves the content length.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use strata_core::error::{Error, Result};
use strata_core::protocol::BackendIdentity;
use strata_core::traits::RemoteFileService;

/// Timeout for remote directory listings.
pub const LIST_REMOTE_FILE_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for content-length probes.
pub const GET_LENGTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds a tablet file-service URL for the given peer and remote path.
#[must_use]
pub fn tablet_download_url(src: &BackendIdentity, token: &str, file_path: &str) -> String {
    format!(
        "http://{}:{}/api/_tablet/_download?token={token}&file={file_path}",
        src.host, src.http_port
    )
}

/// [`RemoteFileService`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFileService {
    client: reqwest::Client,
}

impl HttpFileService {
    /// Creates the service with a shared connection pool.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the HTTP client cannot be
    /// built.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::configuration(format!("failed to create http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteFileService for HttpFileService {
    async fn list_dir(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(LIST_REMOTE_FILE_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::http(format!("list remote dir failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::http(format!("list remote dir rejected: {e}")))?;

        response
            .text()
            .await
            .map_err(|e| Error::http(format!("list remote dir body failed: {e}")))
    }

    async fn content_length(&self, url: &str) -> Result<u64> {
        let response = self
            .client
            .head(url)
            .timeout(GET_LENGTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::http(format!("get file length failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::http(format!("get file length rejected: {e}")))?;

        response
            .content_length()
            .ok_or_else(|| Error::http("remote file has no content length".to_string()))
    }

    async fn download(&self, url: &str, local_path: &Path, timeout: Duration) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::http(format!("download failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::http(format!("download rejected: {e}")))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::http(format!("download body failed: {e}")))?;

        tokio::fs::write(local_path, &body).await.map_err(|e| {
            Error::io_with_source(format!("write {} failed", local_path.display()), e)
        })?;
        Ok(body.len() as u64)
    }
}
