//! Error types for the daily ranking pipeline.
//!
//! Uses `thiserror` for structured error definitions, one enum per
//! pipeline stage, so callers can decide per item whether to skip,
//! retry or abort the run.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while establishing an authenticated pixiv session.
#[derive(Error, Debug)]
pub enum AuthError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The one-time login form token is missing from the login page
    #[error("Login token not found on login page")]
    TokenNotFound,

    /// The site refused the submitted credentials
    #[error("Login rejected: {0}")]
    Rejected(String),

    /// A cookie file was found but could not be loaded
    #[error("Failed to load session cookies: {0}")]
    CookieFile(String),
}

/// Errors raised while rendering or driving the browser.
#[derive(Error, Debug)]
pub enum RenderError {
    /// No element matched the selector
    #[error("Element not found: {0}")]
    NoSuchElement(String),

    /// The element exists but cannot be clicked or is not visible
    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    /// Could not start or reach the WebDriver server
    #[error("WebDriver session failed: {0}")]
    Session(String),

    /// Any other fault reported by the browser
    #[error("Browser command failed: {0}")]
    Command(String),
}

impl RenderError {
    /// Returns true for faults that mean "nothing to interact with here".
    ///
    /// Interaction loops swallow these and move on instead of failing.
    pub fn is_interaction(&self) -> bool {
        matches!(
            self,
            RenderError::NoSuchElement(_) | RenderError::NotInteractable(_)
        )
    }
}

/// Errors raised while scraping the ranking listing.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Authentication failed; fatal to the run
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A listing entry lacks a required attribute
    #[error("Failed to parse ranking entry {index}: missing {attribute}")]
    ParseError { index: usize, attribute: &'static str },

    /// The required element isn't found in HTML
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Browser rendering failed
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Errors raised while downloading an asset.
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Writing the asset to disk failed
    #[error("Failed to write asset: {0}")]
    Io(#[from] std::io::Error),

    /// Declared and written byte counts differ
    #[error("Integrity check failed: expected {expected} bytes, wrote {written}")]
    Integrity { expected: u64, written: u64 },

    /// The server did not declare a content length
    #[error("Missing Content-Length for {0}")]
    MissingContentLength(String),

    /// URL parsing or validation failed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Returns true if this is a byte-count mismatch.
    pub fn is_integrity(&self) -> bool {
        matches!(self, FetchError::Integrity { .. })
    }
}

/// Errors raised while sending to the channel.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The send did not complete within the configured timeout
    #[error("Send timed out")]
    Timeout,

    /// The send was interrupted
    #[error("Send interrupted")]
    Interrupted,

    /// The channel asked us to slow down
    #[error("Rate limited, retry after {0:?}")]
    RateLimited(Duration),

    /// The channel API rejected the request
    #[error("Channel API error: {0}")]
    Api(String),

    /// The bot HTTP client could not be built
    #[error("Failed to build bot client: {0}")]
    Client(String),

    /// Reading the photo from disk failed
    #[error("Failed to read photo: {0}")]
    Io(#[from] std::io::Error),
}

impl PublishError {
    /// Returns true for timeout and interrupt classes, which skip the item
    /// immediately instead of consuming the retry budget.
    pub fn is_fast_fail(&self) -> bool {
        matches!(self, PublishError::Timeout | PublishError::Interrupted)
    }
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Missing required configuration value
    #[error("Missing required config value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_classification() {
        assert!(RenderError::NoSuchElement("button".into()).is_interaction());
        assert!(RenderError::NotInteractable("img".into()).is_interaction());
        assert!(!RenderError::Session("refused".into()).is_interaction());
        assert!(!RenderError::Command("crashed".into()).is_interaction());
    }

    #[test]
    fn test_fast_fail_classification() {
        assert!(PublishError::Timeout.is_fast_fail());
        assert!(PublishError::Interrupted.is_fast_fail());
        assert!(!PublishError::Api("Bad Request".into()).is_fast_fail());
        assert!(!PublishError::RateLimited(Duration::from_secs(3)).is_fast_fail());
    }

    #[test]
    fn test_integrity_message() {
        let err = FetchError::Integrity {
            expected: 10,
            written: 4,
        };
        assert!(err.is_integrity());
        assert_eq!(
            err.to_string(),
            "Integrity check failed: expected 10 bytes, wrote 4"
        );
    }
}
