//! Browser rendering backend.
//!
//! The resolver only talks to the [`Renderer`] trait. [`WebDriverRenderer`]
//! implements it over a WebDriver session, optionally spawning the driver
//! binary for the lifetime of the session.

use crate::config::WebDriverConfig;
use crate::cookies::SessionCookie;
use crate::error::RenderError;
use crate::utils::with_retry;
use async_trait::async_trait;
use fantoccini::actions::{InputSource, MouseActions, PointerAction};
use fantoccini::cookies::Cookie;
use fantoccini::elements::Element;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Connection attempts while a freshly spawned driver boots.
const CONNECT_ATTEMPTS: u32 = 10;

/// Pause between connection attempts.
const CONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// Input source id for pointer actions.
const POINTER_ID: &str = "mouse";

/// Capabilities a rendering engine must offer to the resolver.
///
/// Lookups that find nothing return [`RenderError::NoSuchElement`]; clicks
/// on hidden or covered elements return [`RenderError::NotInteractable`].
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Handle to an element in the current page.
    type Element: Send + Sync;

    /// Loads `url` in the current window.
    async fn navigate(&self, url: &str) -> Result<(), RenderError>;

    /// Adds a cookie for `domain` to the browser.
    async fn add_cookie(&self, cookie: &SessionCookie, domain: &str) -> Result<(), RenderError>;

    /// Finds the first element in the page matching a CSS selector.
    async fn find_element(&self, css: &str) -> Result<Self::Element, RenderError>;

    /// Finds the first descendant of `parent` matching a CSS selector.
    async fn find_within(
        &self,
        parent: &Self::Element,
        css: &str,
    ) -> Result<Self::Element, RenderError>;

    /// Moves the pointer onto the element.
    async fn hover(&self, element: &Self::Element) -> Result<(), RenderError>;

    /// Clicks the element.
    async fn click(&self, element: &Self::Element) -> Result<(), RenderError>;

    /// Reads an attribute or property of the element.
    async fn read_attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, RenderError>;

    /// Returns the current rendered DOM as HTML.
    async fn page_source(&self) -> Result<String, RenderError>;

    /// Ends the browser session.
    async fn close(&self) -> Result<(), RenderError>;
}

/// A WebDriver-backed browser session.
pub struct WebDriverRenderer {
    client: Client,
    /// Spawned driver, killed when the renderer is dropped.
    _driver: Option<Child>,
}

impl WebDriverRenderer {
    /// Starts the driver if configured, then opens a new browser session.
    pub async fn connect(config: &WebDriverConfig) -> Result<Self, RenderError> {
        let driver = match config.driver_command.as_deref() {
            Some(command) => Some(spawn_driver(command, config.driver_port)?),
            None => None,
        };

        let mut builder = ClientBuilder::native();
        builder.capabilities(capabilities(config.headless));

        let client = with_retry(
            if driver.is_some() { CONNECT_ATTEMPTS } else { 1 },
            |_| true,
            |attempt| {
                let builder = &builder;
                async move {
                    if attempt > 1 {
                        tokio::time::sleep(CONNECT_BACKOFF).await;
                    }
                    builder.connect(&config.url).await
                }
            },
        )
        .await
        .map_err(|e| RenderError::Session(format!("{}: {}", config.url, e)))?;

        info!(url = %config.url, "Browser session started");

        Ok(Self {
            client,
            _driver: driver,
        })
    }
}

fn capabilities(headless: bool) -> serde_json::Map<String, serde_json::Value> {
    let mut caps = serde_json::Map::new();
    if headless {
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({ "args": ["--headless=new", "--window-size=1920,1080"] }),
        );
        caps.insert(
            "moz:firefoxOptions".to_string(),
            json!({ "args": ["-headless"] }),
        );
    }
    caps
}

fn spawn_driver(command: &str, port: u16) -> Result<Child, RenderError> {
    let binary = which::which(command)
        .map_err(|e| RenderError::Session(format!("driver '{}' not found: {}", command, e)))?;

    debug!(driver = %binary.display(), port, "Spawning WebDriver");

    Command::new(&binary)
        .arg(format!("--port={}", port))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RenderError::Session(format!("failed to start {}: {}", binary.display(), e)))
}

/// Maps a WebDriver failure onto the resolver's error classes.
fn classify(context: &str, err: CmdError) -> RenderError {
    match &err {
        CmdError::Standard(wd) => match wd.error {
            ErrorStatus::NoSuchElement => RenderError::NoSuchElement(context.to_string()),
            ErrorStatus::ElementNotInteractable | ErrorStatus::ElementClickIntercepted => {
                RenderError::NotInteractable(format!("{}: {}", context, err))
            }
            _ => RenderError::Command(format!("{}: {}", context, err)),
        },
        _ => RenderError::Command(format!("{}: {}", context, err)),
    }
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<(), RenderError> {
        self.client
            .goto(url)
            .await
            .map_err(|e| classify(&format!("navigate {}", url), e))
    }

    async fn add_cookie(&self, cookie: &SessionCookie, domain: &str) -> Result<(), RenderError> {
        let mut browser_cookie = Cookie::new(cookie.name.clone(), cookie.value.clone());
        browser_cookie.set_domain(domain.to_string());
        browser_cookie.set_path("/");
        browser_cookie.set_secure(true);

        self.client
            .add_cookie(browser_cookie)
            .await
            .map_err(|e| classify(&format!("cookie {}", cookie.name), e))
    }

    async fn find_element(&self, css: &str) -> Result<Element, RenderError> {
        self.client
            .find(Locator::Css(css))
            .await
            .map_err(|e| classify(css, e))
    }

    async fn find_within(&self, parent: &Element, css: &str) -> Result<Element, RenderError> {
        parent
            .find(Locator::Css(css))
            .await
            .map_err(|e| classify(css, e))
    }

    async fn hover(&self, element: &Element) -> Result<(), RenderError> {
        let actions = MouseActions::new(POINTER_ID.to_string()).then(PointerAction::MoveToElement {
            element: element.clone(),
            duration: None,
            x: 0,
            y: 0,
        });
        self.client
            .perform_actions(actions)
            .await
            .map_err(|e| classify("hover", e))
    }

    async fn click(&self, element: &Element) -> Result<(), RenderError> {
        element.click().await.map_err(|e| classify("click", e))
    }

    async fn read_attribute(
        &self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, RenderError> {
        element
            .attr(name)
            .await
            .map_err(|e| classify(&format!("attribute {}", name), e))
    }

    async fn page_source(&self) -> Result<String, RenderError> {
        self.client
            .source()
            .await
            .map_err(|e| classify("page source", e))
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.client
            .clone()
            .close()
            .await
            .map_err(|e| classify("close session", e))
    }
}
