//! Full-resolution URL resolution.
//!
//! The detail page only loads the original image after the user hovers the
//! artwork, dismisses any "view full image" prompts and clicks it. This
//! module replays that sequence through a [`Renderer`].

use super::render::Renderer;
use crate::config::{PixivConfig, ScrapingConfig};
use crate::error::RenderError;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, error};

/// Interactive artwork container on the detail page.
const PRESENTATION: &str = r#"div[role="presentation"]"#;

/// Image inside the artwork container after activation.
static PRESENTATION_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[role="presentation"] img"#).unwrap());

/// Resolves the full-resolution image URL for the work at `link`.
///
/// Returns `None` on any rendering fault, after logging it together with
/// the link, so the caller can skip this work and keep going.
pub async fn resolve_full_image<R: Renderer>(
    renderer: &R,
    pixiv: &PixivConfig,
    scraping: &ScrapingConfig,
    link: &str,
) -> Option<String> {
    match try_resolve(renderer, pixiv, scraping, link).await {
        Ok(url) => Some(url),
        Err(e) => {
            error!(link, error = ?e, "Failed to resolve full image");
            None
        }
    }
}

async fn try_resolve<R: Renderer>(
    renderer: &R,
    pixiv: &PixivConfig,
    scraping: &ScrapingConfig,
    link: &str,
) -> Result<String, RenderError> {
    renderer.navigate(&pixiv.page_url(link)).await?;

    let presentation = locate_presentation(renderer, scraping).await?;

    swallow_interaction(renderer.hover(&presentation).await)?;

    dismiss_prompts(renderer, &presentation, scraping.prompt_attempts).await?;

    let image = renderer.find_within(&presentation, "img").await?;
    match renderer.click(&image).await {
        Ok(()) => {}
        Err(e) if e.is_interaction() => {
            debug!(link, "Image not clickable, reading source directly");
            return renderer
                .read_attribute(&image, "src")
                .await?
                .ok_or_else(|| RenderError::NoSuchElement("img[src]".to_string()));
        }
        Err(e) => return Err(e),
    }

    let html = renderer.page_source().await?;
    image_source(&html).ok_or_else(|| RenderError::NoSuchElement("presentation img[src]".to_string()))
}

/// Polls for the artwork container, sleeping `attempt * step` after each miss.
async fn locate_presentation<R: Renderer>(
    renderer: &R,
    scraping: &ScrapingConfig,
) -> Result<R::Element, RenderError> {
    let mut last_error = RenderError::NoSuchElement(PRESENTATION.to_string());

    for attempt in 0..scraping.locate_attempts {
        match renderer.find_element(PRESENTATION).await {
            Ok(element) => return Ok(element),
            Err(e) if e.is_interaction() => {
                last_error = e;
                tokio::time::sleep(scraping.locate_backoff(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error)
}

/// Clicks prompt buttons inside the container until none is left, one can't
/// be clicked, or `max_prompts` have been clicked.
async fn dismiss_prompts<R: Renderer>(
    renderer: &R,
    presentation: &R::Element,
    max_prompts: u32,
) -> Result<(), RenderError> {
    for _ in 0..max_prompts {
        let button = match renderer.find_within(presentation, "button").await {
            Ok(button) => button,
            Err(e) if e.is_interaction() => break,
            Err(e) => return Err(e),
        };

        match renderer.click(&button).await {
            Ok(()) => debug!("Dismissed image prompt"),
            Err(e) if e.is_interaction() => break,
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

fn swallow_interaction(result: Result<(), RenderError>) -> Result<(), RenderError> {
    match result {
        Err(e) if e.is_interaction() => Ok(()),
        other => other,
    }
}

/// Reads the activated image's source from the rendered DOM.
fn image_source(html: &str) -> Option<String> {
    Html::parse_document(html)
        .select(&PRESENTATION_IMAGE)
        .next()
        .and_then(|img| img.value().attr("src"))
        .filter(|src| !src.is_empty())
        .map(str::to_string)
}
