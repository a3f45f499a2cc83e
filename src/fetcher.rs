//! Asset download with integrity verification.

use crate::config::{DownloadConfig, PixivConfig};
use crate::error::FetchError;
use crate::illustration::Illustration;
use crate::utils::{file_name_from_url, with_retry};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, REFERER};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

/// Downloads resolved assets into a directory.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Writes the asset behind `illustration.large` into `dir`.
    ///
    /// Returns the verified path, or `None` if every attempt wrote a
    /// different number of bytes than the server declared. Transport
    /// failures are returned as errors for the caller to retry.
    async fn fetch(
        &self,
        illustration: &Illustration,
        dir: &Path,
    ) -> Result<Option<PathBuf>, FetchError>;
}

/// Fetches assets over HTTP, sending the detail page as referer.
pub struct HttpFetcher {
    client: reqwest::Client,
    pixiv: PixivConfig,
    integrity_attempts: u32,
}

impl HttpFetcher {
    /// Creates a fetcher with its own HTTP client.
    pub fn new(pixiv: &PixivConfig, download: &DownloadConfig) -> Result<Self, FetchError> {
        // Decompression would strip the declared length we verify against.
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .no_gzip()
            .no_brotli()
            .timeout(Duration::from_secs(download.timeout_sec))
            .build()?;

        Ok(Self {
            client,
            pixiv: pixiv.clone(),
            integrity_attempts: download.integrity_attempts,
        })
    }

    /// Performs one GET and writes the body to `dest`, returning the bytes
    /// written once they match the declared length.
    async fn fetch_once(&self, url: &str, referer: &str, dest: &Path) -> Result<u64, FetchError> {
        let response = self
            .client
            .get(url)
            .header(REFERER, referer)
            .send()
            .await?
            .error_for_status()?;

        let expected = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| FetchError::MissingContentLength(url.to_string()))?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            // A body cut short of its declared length surfaces as a body error.
            let chunk = chunk.map_err(|e| {
                if (e.is_body() || e.is_decode()) && !e.is_timeout() {
                    FetchError::Integrity { expected, written }
                } else {
                    FetchError::HttpError(e)
                }
            })?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written != expected {
            return Err(FetchError::Integrity { expected, written });
        }
        Ok(written)
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(
        &self,
        illustration: &Illustration,
        dir: &Path,
    ) -> Result<Option<PathBuf>, FetchError> {
        let Some(url) = illustration.large.as_deref() else {
            return Ok(None);
        };
        let name = file_name_from_url(url).ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;
        let dest = dir.join(name);
        let referer = self.pixiv.page_url(&illustration.link);

        debug!(url, "Caching");

        let result = with_retry(self.integrity_attempts, FetchError::is_integrity, |_| {
            self.fetch_once(url, &referer, &dest)
        })
        .await;

        match result {
            Ok(bytes) => {
                debug!(path = %dest.display(), bytes, "Cached");
                Ok(Some(dest))
            }
            Err(e) if e.is_integrity() => {
                error!(link = %illustration.link, error = %e, "Unable to download");
                let _ = tokio::fs::remove_file(&dest).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
