//! Pixiv Daily - posts pixiv's daily illustration ranking to a Telegram channel.
//!
//! This library provides:
//! - Logging in to pixiv and rendering the daily ranking in a WebDriver browser
//! - Resolving each work's full-resolution image through the detail page
//! - Downloading assets with a declared-length integrity check
//! - Publishing the batch to a channel with per-item retry
//! - A daily scheduler driving the whole pipeline

pub mod config;
pub mod console;
pub mod cookies;
pub mod error;
pub mod fetcher;
pub mod illustration;
pub mod pipeline;
pub mod publisher;
pub mod resolver;
pub mod scheduler;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use console::Console;
pub use error::{AuthError, ConfigError, FetchError, PublishError, RenderError, ScrapeError};
pub use fetcher::{AssetFetcher, HttpFetcher};
pub use illustration::Illustration;
pub use pipeline::{Pipeline, RunReport};
pub use publisher::{Channel, Publisher, TelegramChannel};
pub use resolver::{PixivResolver, RankingSource};
pub use scheduler::{Job, Scheduler};
