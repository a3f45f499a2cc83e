//! One end-to-end run: resolve the ranking, download, publish.

use crate::error::FetchError;
use crate::fetcher::AssetFetcher;
use crate::illustration::Illustration;
use crate::publisher::{Channel, Publisher};
use crate::resolver::RankingSource;
use crate::scheduler::Job;
use crate::utils::with_retry;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{error, info, warn};

/// Counts of what one run got through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub listed: usize,
    pub resolved: usize,
    pub downloaded: usize,
    pub published: usize,
}

/// Wires a ranking source, an asset fetcher and a publisher together.
pub struct Pipeline<S, F, C> {
    source: S,
    fetcher: F,
    publisher: Publisher<C>,
    download_attempts: u32,
}

impl<S, F, C> Pipeline<S, F, C>
where
    S: RankingSource,
    F: AssetFetcher,
    C: Channel,
{
    /// `download_attempts` bounds retries of transport failures per asset.
    pub fn new(source: S, fetcher: F, publisher: Publisher<C>, download_attempts: u32) -> Self {
        Self {
            source,
            fetcher,
            publisher,
            download_attempts,
        }
    }

    /// Runs the whole flow once.
    ///
    /// Only a failure to obtain the ranking aborts the run; per-item
    /// download and send failures are logged and skipped. Downloads live
    /// in a temporary directory removed before returning.
    pub async fn run_once(&self) -> Result<RunReport> {
        let mut batch = self
            .source
            .fetch_ranking()
            .await
            .context("Failed to collect the daily ranking")?;

        let mut report = RunReport {
            listed: batch.len(),
            resolved: batch.iter().filter(|i| i.is_resolved()).count(),
            ..RunReport::default()
        };
        info!(listed = report.listed, resolved = report.resolved, "Ranking collected");

        let dir = tempfile::Builder::new()
            .prefix("pixiv-daily-")
            .tempdir()
            .context("Failed to create download directory")?;

        for item in batch.iter_mut().filter(|i| i.is_resolved()) {
            if self.download_item(item, dir.path()).await {
                report.downloaded += 1;
            }
        }
        info!(downloaded = report.downloaded, "Downloads finished");

        report.published = self.publisher.publish(&batch).await;

        if let Err(e) = dir.close() {
            warn!(error = %e, "Failed to remove download directory");
        }

        Ok(report)
    }

    async fn download_item(&self, item: &mut Illustration, dir: &Path) -> bool {
        let current: &Illustration = item;
        let result = with_retry(
            self.download_attempts,
            |_: &FetchError| true,
            |_| self.fetcher.fetch(current, dir),
        )
        .await;

        match result {
            Ok(Some(path)) => {
                item.local_path = Some(path);
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!(link = %item.link, error = %e, "Download failed");
                false
            }
        }
    }
}

#[async_trait]
impl<S, F, C> Job for Pipeline<S, F, C>
where
    S: RankingSource,
    F: AssetFetcher,
    C: Channel,
{
    async fn run(&self) -> Result<()> {
        let report = self.run_once().await?;
        info!(
            listed = report.listed,
            resolved = report.resolved,
            downloaded = report.downloaded,
            published = report.published,
            "Daily run complete"
        );
        Ok(())
    }
}
