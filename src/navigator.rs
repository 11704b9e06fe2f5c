//! Catalog navigation
//!
//! Two ways of discovering products, one per site template:
//! - menu: main navigation bar -> category pages -> product title links
//! - listing: `collections/all?page=N`, walked until a page has no products
//!
//! This module only reads documents; fetching and the walk itself belong to
//! the pipeline.

use scraper::{ElementRef, Html};
use tracing::debug;
use url::Url;

use crate::error::{FetchError, NavigationError};
use crate::query::{find_all_by_class, find_one_by_class, inner_text};

pub const MAIN_NAV_SECTION_CLASS: &str = "main-nav-bar";
pub const CATEGORY_ITEM_CLASS: &str = "has-children";
pub const PRODUCT_TITLE_CLASS: &str = "product-item-title";
pub const LISTING_PATH: &str = "/collections/all";

/// A named link discovered while navigating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub url: String,
}

pub type CategoryLink = Link;
pub type ProductLink = Link;

impl Link {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// One link per anchor found under `nodes`, first occurrence of each href
/// wins, returned in reverse of document order.
///
/// The menu markup lists categories bottom-up relative to how they are
/// displayed, so reversing restores the visual order. Anchors without an
/// href are ignored.
pub fn links_from_anchors(nodes: &[ElementRef<'_>]) -> Vec<Link> {
    let mut links: Vec<Link> = Vec::new();

    for node in nodes {
        for anchor in node.descendants().skip(1).filter_map(ElementRef::wrap) {
            if anchor.value().name() != "a" {
                continue;
            }

            let href = match anchor.value().attr("href") {
                Some(h) if !h.trim().is_empty() => h.trim(),
                _ => continue,
            };

            if links.iter().any(|link| link.url == href) {
                continue;
            }

            links.push(Link::new(clean_link_text(&inner_text(anchor)), href));
        }
    }

    links.reverse();
    links
}

/// Normalise anchor text: collapse whitespace, undo the double-encoded
/// ampersand and the bullet the menu uses in its place
fn clean_link_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("&amp;", "&")
        .replace('•', "&")
}

/// Category links out of the home page's main navigation bar
pub fn category_links(page: &Html) -> Result<Vec<CategoryLink>, NavigationError> {
    let root = page.root_element();

    let nav = find_one_by_class(root, "section", MAIN_NAV_SECTION_CLASS, false)
        .ok_or(NavigationError::MainNavMissing)?;

    let category_nodes = find_all_by_class(nav, "li", CATEGORY_ITEM_CLASS, false);
    debug!(count = category_nodes.len(), "found category nodes");
    if category_nodes.is_empty() {
        return Err(NavigationError::NoCategories);
    }

    let links = links_from_anchors(&category_nodes);
    if links.is_empty() {
        return Err(NavigationError::NoCategoryLinks);
    }

    Ok(links)
}

/// Product links out of a category page's product title headings
pub fn product_links(page: &Html) -> Vec<ProductLink> {
    let titles = find_all_by_class(page.root_element(), "h5", PRODUCT_TITLE_CLASS, false);
    links_from_anchors(&titles)
}

/// Resolve a possibly relative href against the page it was found on
pub fn resolve(base: &Url, href: &str) -> Result<String, FetchError> {
    base.join(href)
        .map(String::from)
        .map_err(|_| FetchError::InvalidUrl(href.to_string()))
}

/// Endless sequence of listing page URLs starting at page 1
#[derive(Debug, Clone)]
pub struct ListingPages {
    base: Url,
    next: usize,
}

impl ListingPages {
    pub fn new(site_root: &Url) -> Result<Self, FetchError> {
        let base = site_root
            .join(LISTING_PATH)
            .map_err(|_| FetchError::InvalidUrl(LISTING_PATH.to_string()))?;
        Ok(Self { base, next: 1 })
    }
}

impl Iterator for ListingPages {
    type Item = (usize, String);

    fn next(&mut self) -> Option<Self::Item> {
        let number = self.next;
        self.next = self.next.saturating_add(1);

        let mut url = self.base.clone();
        url.query_pairs_mut().clear().append_pair("page", &number.to_string());
        Some((number, url.into()))
    }
}
