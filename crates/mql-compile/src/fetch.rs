//! Toolchain archive retrieval.
//!
//! Downloads are idempotent: an existing destination file is trusted and no
//! request is made. Redirects are followed by hand so the hop count stays
//! bounded and every hop shows up in the logs.

use std::path::Path;

use reqwest::header::LOCATION;
use reqwest::{redirect, Client, Response, Url};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::cleanup;
use crate::error::FetchError;

/// Default bound on followed redirects.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// What a successful fetch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Destination already existed; nothing was requested.
    Skipped,

    /// Body was streamed to the destination.
    Downloaded { bytes: u64 },
}

/// HTTP(S) fetcher for toolchain archives.
pub struct ArtifactFetcher {
    client: Client,
    max_redirects: usize,
}

impl ArtifactFetcher {
    /// Create a fetcher with the default redirect bound.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_max_redirects(DEFAULT_MAX_REDIRECTS)
    }

    /// Create a fetcher following at most `max_redirects` redirects.
    pub fn with_max_redirects(max_redirects: usize) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("mql-compile/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            max_redirects,
        })
    }

    /// Fetch `uri` into `dest`.
    pub async fn fetch(&self, uri: &str, dest: &Path) -> Result<FetchOutcome, FetchError> {
        if dest.exists() {
            info!(
                uri = %uri,
                dest = %dest.display(),
                "Skipping download, destination already exists"
            );
            return Ok(FetchOutcome::Skipped);
        }

        let mut url = Url::parse(uri).map_err(|e| FetchError::InvalidUrl {
            url: uri.to_string(),
            reason: e.to_string(),
        })?;

        for hop in 0..=self.max_redirects {
            debug!(url = %url, hop = hop, "Requesting");
            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();

            if status.is_success() {
                let bytes = stream_to_file(response, dest).await?;
                info!(dest = %dest.display(), bytes = bytes, "Download complete");
                return Ok(FetchOutcome::Downloaded { bytes });
            }

            if let Some(location) = response.headers().get(LOCATION) {
                let location = location.to_str().map_err(|e| FetchError::InvalidUrl {
                    url: String::from_utf8_lossy(location.as_bytes()).into_owned(),
                    reason: e.to_string(),
                })?;
                let next = response
                    .url()
                    .join(location)
                    .map_err(|e| FetchError::InvalidUrl {
                        url: location.to_string(),
                        reason: e.to_string(),
                    })?;
                debug!(status = status.as_u16(), from = %url, to = %next, "Following redirect");
                url = next;
                continue;
            }

            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        Err(FetchError::TooManyRedirects {
            uri: uri.to_string(),
            limit: self.max_redirects,
        })
    }
}

/// Stream a response body into `dest`, removing the file again on failure.
async fn stream_to_file(response: Response, dest: &Path) -> Result<u64, FetchError> {
    let file = File::create(dest).await.map_err(|source| FetchError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    match write_body(response, file, dest).await {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            cleanup::remove_file(dest).log("partial download", dest);
            Err(e)
        }
    }
}

async fn write_body(mut response: Response, mut file: File, dest: &Path) -> Result<u64, FetchError> {
    let io_error = |source| FetchError::Io {
        path: dest.to_path_buf(),
        source,
    };

    let expected = response.content_length();
    let mut received = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await.map_err(io_error)?;
        received += chunk.len() as u64;
    }
    file.flush().await.map_err(io_error)?;

    if let Some(expected) = expected {
        if expected != received {
            return Err(FetchError::Truncated { expected, received });
        }
    }

    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_existing_destination_skips_network() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("toolchain.zip");
        std::fs::write(&dest, b"cached").unwrap();

        // Port 9 (discard) is never served; any request would fail.
        let fetcher = ArtifactFetcher::new().unwrap();
        let outcome = fetcher
            .fetch("http://127.0.0.1:9/never.zip", &dest)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Skipped);
        assert_eq!(std::fs::read(&dest).unwrap(), b"cached");
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let dir = tempdir().unwrap();
        let fetcher = ArtifactFetcher::new().unwrap();
        let err = fetcher
            .fetch("not a url", &dir.path().join("x.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_connection_error_leaves_no_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("x.zip");
        let fetcher = ArtifactFetcher::new().unwrap();

        let err = fetcher.fetch("http://127.0.0.1:9/x.zip", &dest).await;
        assert!(matches!(err, Err(FetchError::Http(_))));
        assert!(!dest.exists());
    }
}
