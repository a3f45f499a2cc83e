//! Ranking resolution: login, ranking page rendering, listing extraction
//! and full-resolution URL lookup.
//!
//! [`RankingSource`] is the seam the pipeline depends on; [`PixivResolver`]
//! is the live implementation backed by a WebDriver browser.

mod auth;
mod full_image;
mod listing;
mod render;

pub use auth::{Session, authenticate};
pub use full_image::resolve_full_image;
pub use listing::extract_listing;
pub use render::{Renderer, WebDriverRenderer};

use crate::config::{Config, PixivConfig, ScrapingConfig, WebDriverConfig};
use crate::error::ScrapeError;
use crate::illustration::Illustration;
use async_trait::async_trait;
use reqwest::cookie::Jar;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Produces the ranked batch for one run.
#[async_trait]
pub trait RankingSource: Send + Sync {
    /// Returns the ranked works in listing order, each with `large` set if
    /// its full-resolution URL could be resolved.
    async fn fetch_ranking(&self) -> Result<Vec<Illustration>, ScrapeError>;
}

/// Live ranking source for pixiv.
pub struct PixivResolver {
    pixiv: PixivConfig,
    webdriver: WebDriverConfig,
    scraping: ScrapingConfig,
    cookie_file: Option<PathBuf>,
}

impl PixivResolver {
    /// Creates a resolver. With `cookie_file` set, login uses the exported
    /// cookies instead of the password handshake.
    pub fn new(config: &Config, cookie_file: Option<PathBuf>) -> Self {
        Self {
            pixiv: config.pixiv.clone(),
            webdriver: config.webdriver.clone(),
            scraping: config.scraping.clone(),
            cookie_file,
        }
    }
}

#[async_trait]
impl RankingSource for PixivResolver {
    async fn fetch_ranking(&self) -> Result<Vec<Illustration>, ScrapeError> {
        let session = authenticate(&self.pixiv, self.cookie_file.as_deref()).await?;

        info!("Initializing browser");
        let renderer = WebDriverRenderer::connect(&self.webdriver).await?;

        let result = collect_ranking(&renderer, &session, &self.pixiv, &self.scraping).await;

        if let Err(e) = renderer.close().await {
            warn!(error = %e, "Failed to close browser session");
        }

        result
    }
}

/// Renders the ranking with the session's cookies, then resolves every
/// listed work in order.
pub async fn collect_ranking<R: Renderer>(
    renderer: &R,
    session: &Session,
    pixiv: &PixivConfig,
    scraping: &ScrapingConfig,
) -> Result<Vec<Illustration>, ScrapeError> {
    let html = render_ranking_page(renderer, session, pixiv).await?;
    let mut items = extract_listing(&html)?;
    info!(count = items.len(), "Found ranking entries");

    for item in &mut items {
        rate_limit(scraping.delay_between_requests_sec).await;
        item.large = resolve_full_image(renderer, pixiv, scraping, &item.link).await;
        debug!(
            author = %item.author,
            id = %item.data_id,
            link = %item.link,
            large = item.large.as_deref().unwrap_or("(unresolved)"),
            "Resolved ranking entry"
        );
    }

    Ok(items)
}

/// Loads the ranking listing in the browser after importing the session's
/// cookies, and returns the rendered HTML.
pub async fn render_ranking_page<R: Renderer>(
    renderer: &R,
    session: &Session,
    pixiv: &PixivConfig,
) -> Result<String, ScrapeError> {
    // Cookies can only be set for the origin currently loaded.
    renderer.navigate(&pixiv.base_url).await?;

    let domain = cookie_domain(&pixiv.base_url);
    let cookies = session.cookies_for(&pixiv.base_url);
    info!(count = cookies.len(), "Importing session cookies into browser");
    for cookie in &cookies {
        renderer.add_cookie(cookie, &domain).await?;
    }

    renderer.navigate(&pixiv.ranking_url).await?;
    Ok(renderer.page_source().await?)
}

/// Returns the cookie domain covering the site and its subdomains.
fn cookie_domain(base_url: &str) -> String {
    let host = url::Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    format!(".{}", host.trim_start_matches("www."))
}

/// Common HTTP client configuration for the site session.
pub fn create_http_client(jar: Arc<Jar>) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
        .cookie_provider(jar)
        .timeout(Duration::from_secs(30))
        .build()
}

/// Applies rate limiting delay.
pub async fn rate_limit(delay_sec: f64) {
    if delay_sec > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(delay_sec)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::full_image::tests::{FakeRenderer, ImageClick, LARGE, PageScript, fast_scraping};
    use super::listing::tests::{entry, page};
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_cookie_domain() {
        assert_eq!(cookie_domain("https://www.pixiv.net"), ".pixiv.net");
        assert_eq!(cookie_domain("http://127.0.0.1:8080"), ".127.0.0.1");
    }

    async fn logged_in_session(server: &MockServer) -> (Session, PixivConfig) {
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"<input name="post_key" value="k">"#),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "PHPSESSID=sess; Path=/")
                    .set_body_string(r#"{"error":false,"message":"","body":{}}"#),
            )
            .mount(server)
            .await;

        let pixiv = PixivConfig {
            username: "user".into(),
            password: "pass".into(),
            base_url: server.uri(),
            login_page_url: format!("{}/login", server.uri()),
            login_api_url: format!("{}/api/login", server.uri()),
            ranking_url: format!("{}/ranking.php?mode=daily", server.uri()),
        };
        let session = authenticate(&pixiv, None).await.unwrap();
        (session, pixiv)
    }

    #[tokio::test]
    async fn test_collect_ranking_marks_unresolvable_items() {
        let server = MockServer::start().await;
        let (session, pixiv) = logged_in_session(&server).await;

        let mut renderer = FakeRenderer::new(vec![
            ("/artworks/1".to_string(), PageScript::default()),
            (
                "/artworks/2".to_string(),
                PageScript {
                    image_click: ImageClick::Crashes,
                    ..PageScript::default()
                },
            ),
        ]);
        renderer.ranking_html = page(&[entry("1", "alice", "a b"), entry("2", "bob", "c")]);

        let items = collect_ranking(&renderer, &session, &pixiv, &fast_scraping())
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].large.as_deref(), Some(LARGE));
        assert_eq!(items[1].large, None);

        let state = renderer.state.lock().unwrap();
        assert_eq!(
            state.cookies,
            vec![("PHPSESSID".to_string(), ".127.0.0.1".to_string())]
        );
    }
}
