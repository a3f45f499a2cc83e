//! The per-item record carried through one pipeline run.

use std::path::PathBuf;

/// One ranked work scraped from the daily listing.
///
/// `data_id` and `link` are fixed at creation. `large` is filled by the
/// resolver and `local_path` by the fetcher once the asset is verified on
/// disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Illustration {
    /// Author display name.
    pub author: String,

    /// Author member id.
    pub author_id: String,

    /// Work id within the ranking listing.
    pub data_id: String,

    /// Site-relative path to the detail page, e.g. `/artworks/123`.
    pub link: String,

    /// Full-resolution asset URL, `None` when resolution failed.
    pub large: Option<String>,

    /// Preview image URL from the listing.
    pub thumbnail: String,

    /// Tags in listing order.
    pub tags: Vec<String>,

    /// Downloaded asset, set only after a verified write.
    pub local_path: Option<PathBuf>,

    /// Always true; nothing clears it yet.
    pub available: bool,
}

impl Illustration {
    /// Creates a record from listing metadata with nothing resolved yet.
    pub fn new(
        author: String,
        author_id: String,
        data_id: String,
        link: String,
        thumbnail: String,
        tags: Vec<String>,
    ) -> Self {
        Self {
            author,
            author_id,
            data_id,
            link,
            large: None,
            thumbnail,
            tags,
            local_path: None,
            available: true,
        }
    }

    /// Returns true if a full-resolution URL was resolved.
    pub fn is_resolved(&self) -> bool {
        self.large.is_some()
    }
}
