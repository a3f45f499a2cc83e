//! Configuration management for the daily ranking daemon.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory.
const APP_NAME: &str = "PixivDaily";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Placeholder value for unconfigured secrets.
const SECRET_PLACEHOLDER: &str = "CHANGE_ME";

/// Upper bound for configured sleeps, in seconds.
const MAX_DELAY_SEC: f64 = 3600.0;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Site account and endpoints.
    pub pixiv: PixivConfig,

    /// Browser automation settings.
    pub webdriver: WebDriverConfig,

    /// Listing and resolution settings.
    pub scraping: ScrapingConfig,

    /// Asset download settings.
    pub download: DownloadConfig,

    /// Channel publishing settings.
    pub telegram: TelegramConfig,
}

/// Account credentials and site endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PixivConfig {
    /// Login id (e-mail or pixiv id).
    pub username: String,

    /// Account password.
    pub password: String,

    /// Site root, prefixed to detail-page links.
    pub base_url: String,

    /// Page carrying the one-time login token.
    pub login_page_url: String,

    /// Endpoint receiving the login form.
    pub login_api_url: String,

    /// Daily ranking listing.
    pub ranking_url: String,
}

impl Default for PixivConfig {
    fn default() -> Self {
        Self {
            username: SECRET_PLACEHOLDER.to_string(),
            password: SECRET_PLACEHOLDER.to_string(),
            base_url: "https://www.pixiv.net".to_string(),
            login_page_url: "https://accounts.pixiv.net/login?lang=en&source=pc&view_type=page&ref=wwwtop_accounts_index".to_string(),
            login_api_url: "https://accounts.pixiv.net/api/login?lang=en".to_string(),
            ranking_url: "https://www.pixiv.net/ranking.php?mode=daily".to_string(),
        }
    }
}

impl PixivConfig {
    /// Checks if credentials were filled in.
    pub fn has_credentials(&self) -> bool {
        is_set(&self.username) && is_set(&self.password)
    }

    /// Builds the absolute detail-page URL for a site-relative link.
    pub fn page_url(&self, link: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), link)
    }
}

/// WebDriver connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverConfig {
    /// WebDriver server endpoint.
    pub url: String,

    /// Run the browser without a window.
    pub headless: bool,

    /// Driver binary to spawn for each run (e.g. "chromedriver").
    /// If not set, an already running server at `url` is used.
    pub driver_command: Option<String>,

    /// Port passed to the spawned driver.
    pub driver_port: u16,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4444".to_string(),
            headless: true,
            driver_command: None,
            driver_port: 4444,
        }
    }
}

/// Listing and resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Delay between detail-page navigations in seconds.
    pub delay_between_requests_sec: f64,

    /// Attempts to locate the image presentation element.
    pub locate_attempts: u32,

    /// Backoff step in seconds; attempt `i` sleeps `i * step`.
    pub locate_backoff_step_sec: f64,

    /// Upper bound on "view full image" prompts dismissed per work.
    pub prompt_attempts: u32,

    /// Enable debug logging.
    pub debug: bool,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            delay_between_requests_sec: 1.0,
            locate_attempts: 10,
            locate_backoff_step_sec: 1.0,
            prompt_attempts: 10,
            debug: false,
        }
    }
}

impl ScrapingConfig {
    /// Sleep before the next locate attempt, given the failed attempt index.
    pub fn locate_backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.locate_backoff_step_sec.max(0.0) * f64::from(attempt))
    }
}

/// Asset download configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Attempts per download when the byte count mismatches.
    pub integrity_attempts: u32,

    /// Attempts per download when the transfer itself fails.
    pub pipeline_attempts: u32,

    /// HTTP timeout for one download in seconds.
    pub timeout_sec: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            integrity_attempts: 2,
            pipeline_attempts: 2,
            timeout_sec: 120,
        }
    }
}

/// Channel publishing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token.
    pub bot_token: String,

    /// Channel receiving the daily batch (`@name` or numeric chat id).
    pub channel: String,

    /// Channel used for one-shot runs.
    pub debug_channel: String,

    /// Timeout for a single photo send in seconds.
    pub send_timeout_sec: u64,

    /// Attempts per photo before giving up on it.
    pub send_attempts: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: SECRET_PLACEHOLDER.to_string(),
            channel: "@pixiv_daily".to_string(),
            debug_channel: "@example".to_string(),
            send_timeout_sec: 60,
            send_attempts: 5,
        }
    }
}

impl TelegramConfig {
    /// Checks if the bot token is configured (not placeholder).
    pub fn is_configured(&self) -> bool {
        is_set(&self.bot_token)
    }

    /// Returns the send timeout as a duration.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_sec)
    }
}

fn is_set(value: &str) -> bool {
    !value.is_empty() && value != SECRET_PLACEHOLDER
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// Credentials may be omitted when `has_cookie_file` is true, since the
    /// session is then seeded from the exported cookies.
    pub fn validate(&self, has_cookie_file: bool) -> Result<(), ConfigError> {
        if !has_cookie_file && !self.pixiv.has_credentials() {
            return Err(ConfigError::MissingValue(
                "pixiv.username / pixiv.password (or place a pixiv cookie file in the config directory)"
                    .to_string(),
            ));
        }

        if !self.telegram.is_configured() {
            return Err(ConfigError::MissingValue(
                "telegram.bot_token (set your bot token in config file)".to_string(),
            ));
        }

        let counts = [
            ("scraping.locate_attempts", self.scraping.locate_attempts),
            ("download.integrity_attempts", self.download.integrity_attempts),
            ("download.pipeline_attempts", self.download.pipeline_attempts),
            ("telegram.send_attempts", self.telegram.send_attempts),
        ];
        for (key, value) in counts {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
        }

        if self.telegram.send_timeout_sec == 0 {
            return Err(ConfigError::InvalidValue {
                key: "telegram.send_timeout_sec".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        let delays = [
            (
                "scraping.delay_between_requests_sec",
                self.scraping.delay_between_requests_sec,
            ),
            (
                "scraping.locate_backoff_step_sec",
                self.scraping.locate_backoff_step_sec,
            ),
        ];
        for (key, value) in delays {
            if !(0.0..=MAX_DELAY_SEC).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("must be between 0 and {} seconds", MAX_DELAY_SEC),
                });
            }
        }

        Ok(())
    }
}
