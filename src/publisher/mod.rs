//! Publishing the daily batch to a channel.
//!
//! [`Publisher`] owns the send policy: a pinned date header, then one photo
//! per downloaded work with a bounded timeout and retry budget. The
//! transport is behind the [`Channel`] trait; [`TelegramChannel`] is the
//! live one.

mod telegram;

pub use telegram::TelegramChannel;

use crate::config::{PixivConfig, TelegramConfig};
use crate::error::PublishError;
use crate::illustration::Illustration;
use crate::utils::with_retry;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use std::path::Path;
use std::time::Duration;
use teloxide::utils::markdown::{escape, escape_link_url, link};
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

/// Identifier of a message already posted to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostedMessage(pub i32);

/// Send primitives of a messaging channel.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Posts a plain text message.
    async fn send_text(&self, text: &str) -> Result<PostedMessage, PublishError>;

    /// Pins a posted message.
    async fn pin(&self, message: PostedMessage) -> Result<(), PublishError>;

    /// Posts a photo read from `photo` with a MarkdownV2 caption.
    async fn send_photo(&self, photo: &Path, caption: &str) -> Result<(), PublishError>;
}

/// Sends a batch of illustrations to a channel.
pub struct Publisher<C> {
    channel: C,
    site: String,
    send_timeout: Duration,
    send_attempts: u32,
}

impl<C> Publisher<C> {
    /// The channel sends go through.
    pub fn channel(&self) -> &C {
        &self.channel
    }
}

impl<C: Channel> Publisher<C> {
    /// Creates a publisher sending through `channel`.
    pub fn new(channel: C, pixiv: &PixivConfig, telegram: &TelegramConfig) -> Self {
        Self {
            channel,
            site: pixiv.base_url.trim_end_matches('/').to_string(),
            send_timeout: telegram.send_timeout(),
            send_attempts: telegram.send_attempts,
        }
    }

    /// Sends the pinned date header followed by every downloaded work.
    ///
    /// Best effort per item: failures are logged and the next item is sent.
    /// Returns the number of photos delivered.
    pub async fn publish(&self, batch: &[Illustration]) -> usize {
        self.send_date_header(chrono::Local::now().date_naive()).await;

        let mut sent = 0;
        for illustration in batch {
            let Some(path) = illustration.local_path.as_deref() else {
                continue;
            };
            let caption = build_caption(&self.site, illustration);

            match self.send_with_retry(path, &caption).await {
                Ok(()) => sent += 1,
                Err(e) if e.is_fast_fail() => {
                    warn!(path = %path.display(), error = %e, "Send aborted, moving to next item");
                }
                Err(e) => {
                    error!(path = %path.display(), error = ?e, "Giving up on item");
                }
            }
        }

        info!(sent, "Sending sequence completed");
        sent
    }

    async fn send_date_header(&self, today: NaiveDate) {
        let header = long_date(today);
        match self.channel.send_text(&header).await {
            Ok(message) => {
                if let Err(e) = self.channel.pin(message).await {
                    warn!(error = %e, "Failed to pin date header");
                }
            }
            Err(e) => error!(error = %e, "Failed to send date header"),
        }
    }

    async fn send_with_retry(&self, path: &Path, caption: &str) -> Result<(), PublishError> {
        with_retry(
            self.send_attempts,
            |e: &PublishError| !e.is_fast_fail(),
            |attempt| async move {
                debug!(path = %path.display(), attempt, "Sending");
                let result = tokio::time::timeout(
                    self.send_timeout,
                    self.channel.send_photo(path, caption),
                )
                .await
                .unwrap_or(Err(PublishError::Timeout));

                if let Err(PublishError::RateLimited(wait)) = &result {
                    tokio::time::sleep(*wait).await;
                }
                result
            },
        )
        .await
    }
}

/// Formats a date as e.g. "October 24, 2019".
pub fn long_date(date: NaiveDate) -> String {
    format!("{} {}, {}", date.format("%B"), date.day(), date.year())
}

/// Builds the MarkdownV2 caption: author credit, work credit, tag links.
pub fn build_caption(site: &str, illustration: &Illustration) -> String {
    let author_url = format!("{}/member.php?id={}", site, illustration.author_id);
    let work_url = format!("{}{}", site, illustration.link);

    [
        format!(
            "{} {}",
            escape("Author:"),
            link(&escape_link_url(&author_url), &escape(&illustration.author))
        ),
        format!(
            "{} {}",
            escape("Illustration ID:"),
            link(&escape_link_url(&work_url), &escape(&illustration.data_id))
        ),
        format!(
            "{} {}",
            escape("Tags:"),
            tag_links(site, &illustration.tags).join(", ")
        ),
    ]
    .join("\n")
}

/// One hashtag link per tag, in tag order.
pub fn tag_links(site: &str, tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|tag| {
            let url = tag_search_url(site, tag);
            link(&escape_link_url(&url), &escape(&format!("#{}", tag)))
        })
        .collect()
}

fn tag_search_url(site: &str, tag: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("s_mode", "s_tag_full")
        .append_pair("word", tag)
        .finish();
    format!("{}/search.php?{}", site, query)
}
