//! Ranking page parsing.

use crate::error::ScrapeError;
use crate::illustration::Illustration;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::warn;

/// CSS selectors used for parsing the daily ranking.
struct Selectors {
    /// Container of all ranking entries.
    container: Selector,
    /// One ranking entry.
    entry: Selector,
    /// Author link carrying name and id.
    author: Selector,
    /// Link to the detail page.
    work: Selector,
    /// Thumbnail image carrying preview URL and tags.
    image: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    container: Selector::parse("div.ranking-items").unwrap(),
    entry: Selector::parse("section.ranking-item").unwrap(),
    author: Selector::parse("a.user-container").unwrap(),
    work: Selector::parse("a.work").unwrap(),
    image: Selector::parse("img").unwrap(),
});

/// Extracts every well-formed ranking entry, in listing order.
///
/// Entries missing a required attribute are logged and skipped. A page
/// without the ranking container at all is an error, since it means the
/// layout changed or the session is not logged in.
pub fn extract_listing(html: &str) -> Result<Vec<Illustration>, ScrapeError> {
    let doc = Html::parse_document(html);
    let container = doc
        .select(&SELECTORS.container)
        .next()
        .ok_or_else(|| ScrapeError::ElementNotFound("ranking items".to_string()))?;

    let mut items = Vec::new();
    for (index, section) in container.select(&SELECTORS.entry).enumerate() {
        match parse_entry(index, section) {
            Ok(item) => items.push(item),
            Err(e) => warn!(error = %e, "Skipping ranking entry"),
        }
    }

    Ok(items)
}

fn parse_entry(index: usize, section: ElementRef<'_>) -> Result<Illustration, ScrapeError> {
    let missing = |attribute| ScrapeError::ParseError { index, attribute };

    let author_link = section.select(&SELECTORS.author).next();
    let author = author_link
        .and_then(|a| a.value().attr("data-user_name"))
        .ok_or_else(|| missing("data-user_name"))?;
    let author_id = author_link
        .and_then(|a| a.value().attr("data-user_id"))
        .ok_or_else(|| missing("data-user_id"))?;

    let data_id = section
        .value()
        .attr("data-id")
        .ok_or_else(|| missing("data-id"))?;

    let link = section
        .select(&SELECTORS.work)
        .next()
        .and_then(|a| a.value().attr("href"))
        .ok_or_else(|| missing("href"))?;

    let image = section.select(&SELECTORS.image).next();
    let thumbnail = image
        .and_then(|img| img.value().attr("data-src"))
        .ok_or_else(|| missing("data-src"))?;
    let tags = image
        .and_then(|img| img.value().attr("data-tags"))
        .ok_or_else(|| missing("data-tags"))?
        .split_whitespace()
        .map(str::to_string)
        .collect();

    Ok(Illustration::new(
        author.to_string(),
        author_id.to_string(),
        data_id.to_string(),
        link.to_string(),
        thumbnail.to_string(),
        tags,
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Renders one ranking entry the way the live page does.
    pub(crate) fn entry(id: &str, author: &str, tags: &str) -> String {
        format!(
            r#"<section class="ranking-item" data-id="{id}">
                <div class="ranking-image-item">
                    <a class="work" href="/artworks/{id}">
                        <img data-src="https://i.pximg.net/c/240x480/{id}_p0_master1200.jpg" data-tags="{tags}">
                    </a>
                </div>
                <a class="user-container" data-user_name="{author}" data-user_id="9{id}">{author}</a>
            </section>"#
        )
    }

    pub(crate) fn page(entries: &[String]) -> String {
        format!(
            r#"<html><body><div class="ranking-items">{}</div></body></html>"#,
            entries.join("\n")
        )
    }

    #[test]
    fn test_extract_listing() {
        let html = page(&[entry("100", "alice", "original girl"), entry("200", "bob", "")]);
        let items = extract_listing(&html).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].author, "alice");
        assert_eq!(items[0].author_id, "9100");
        assert_eq!(items[0].data_id, "100");
        assert_eq!(items[0].link, "/artworks/100");
        assert_eq!(
            items[0].thumbnail,
            "https://i.pximg.net/c/240x480/100_p0_master1200.jpg"
        );
        assert_eq!(items[0].tags, vec!["original", "girl"]);
        assert!(items[0].large.is_none());

        assert_eq!(items[1].data_id, "200");
        assert!(items[1].tags.is_empty());
    }

    #[test]
    fn test_entry_missing_attribute_is_skipped() {
        let broken = entry("150", "carol", "tag").replace(r#" data-user_id="9150""#, "");
        let no_link = entry("160", "dave", "tag").replace(r#"class="work" "#, "");
        let html = page(&[entry("100", "alice", "a"), broken, no_link, entry("200", "bob", "b")]);

        let items = extract_listing(&html).unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.data_id.as_str()).collect();
        assert_eq!(ids, vec!["100", "200"]);
    }

    #[test]
    fn test_missing_container() {
        let err = extract_listing("<html><body>please log in</body></html>").unwrap_err();
        assert!(matches!(err, ScrapeError::ElementNotFound(_)));
    }

    #[test]
    fn test_empty_ranking() {
        assert!(extract_listing(&page(&[])).unwrap().is_empty());
    }
}
