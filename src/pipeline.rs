//! The catalog walk
//!
//! `CatalogPipeline` ties navigation, extraction and normalization together
//! for the configured site template and accumulates a deduplicated product
//! list. Everything below the site root is best effort: a page or product
//! that fails is logged and skipped, and whatever was gathered before a
//! fatal error is still returned.

use scraper::Html;
use std::collections::HashMap;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::config::{SiteTemplate, SkimmerConfig};
use crate::error::{ExtractError, FetchError, PipelineError};
use crate::export::CatalogExporter;
use crate::extractors::{
    AjaxVariantExtractor, ExtractedProduct, ListingExtractor, PageContext, VariantExtractor,
};
use crate::fetcher::{PageFetcher, Transport};
use crate::navigator::{self, ListingPages};
use crate::normalizer::{normalize, Product};

/// Where the walk currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Navigating,
    Extracting,
    Accumulating,
    Done,
}

impl PipelineState {
    fn advance(&mut self, next: PipelineState) {
        let from = *self;
        if from != next {
            trace!(?from, to = ?next, "pipeline state");
            *self = next;
        }
    }
}

/// Products gathered so far and what has already been seen.
///
/// A source product counts as processed (towards the cap, and as seen)
/// only once it has contributed at least one record.
#[derive(Debug, Default)]
pub struct CatalogAccumulator {
    products: Vec<Product>,
    /// Product page URL -> category it was first recorded under
    seen_urls: HashMap<String, String>,
    /// Source product id -> category it was first recorded under
    seen_ids: HashMap<i64, String>,
    processed: usize,
    skipped: usize,
    cap: Option<usize>,
}

impl CatalogAccumulator {
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            cap,
            ..Self::default()
        }
    }

    pub fn cap_reached(&self) -> bool {
        self.cap.is_some_and(|cap| self.processed >= cap)
    }

    /// Category a product page URL was first recorded under
    pub fn seen_url(&self, url: &str) -> Option<&str> {
        self.seen_urls.get(url).map(String::as_str)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn note_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Normalize and append one extracted product; returns the number of
    /// records added
    pub fn accept(&mut self, extracted: ExtractedProduct) -> usize {
        if let Some(first) = self.seen_ids.get(&extracted.source_product_id) {
            info!(
                product_id = extracted.source_product_id,
                category = %first,
                "skipping {} - already processed",
                extracted.name
            );
            self.skipped += 1;
            return 0;
        }

        let source_product_id = extracted.source_product_id;
        let url = extracted.url.clone();
        let category = extracted.category.clone();
        let name = extracted.name.clone();

        let records = normalize(extracted);
        if records.is_empty() {
            warn!(product_id = source_product_id, url = %url, "no variants for {name}");
            self.skipped += 1;
            return 0;
        }

        for record in &records {
            debug!("{record}");
        }

        let added = records.len();
        self.products.extend(records);
        self.seen_urls.insert(url, category.clone());
        self.seen_ids.insert(source_product_id, category);
        self.processed += 1;
        added
    }

    pub fn take_products(&mut self) -> Vec<Product> {
        std::mem::take(&mut self.products)
    }
}

/// Outcome of a full run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub products: Vec<Product>,
    pub processed: usize,
    pub skipped: usize,
    /// Names of exporters that failed
    pub failed_exports: Vec<&'static str>,
}

pub struct CatalogPipeline<T> {
    config: SkimmerConfig,
    fetcher: PageFetcher<T>,
    state: PipelineState,
    accumulator: CatalogAccumulator,
}

impl<T: Transport> CatalogPipeline<T> {
    pub fn new(config: SkimmerConfig, transport: T) -> Self {
        let accumulator = CatalogAccumulator::new(config.cap());
        Self {
            config,
            fetcher: PageFetcher::new(transport),
            state: PipelineState::Idle,
            accumulator,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &SkimmerConfig {
        &self.config
    }

    /// Walk the catalog and return every product gathered.
    ///
    /// Never fails: an unrecoverable error is logged and the partial list
    /// is returned.
    pub fn parse_catalog(&mut self) -> Vec<Product> {
        if let Err(e) = self.crawl() {
            error!(error = %e, "parsing error");
        }

        self.state.advance(PipelineState::Done);
        info!(
            products = self.accumulator.products().len(),
            processed = self.accumulator.processed(),
            skipped = self.accumulator.skipped(),
            "catalog pass finished"
        );
        self.accumulator.take_products()
    }

    /// `parse_catalog`, then hand the list to every exporter. A failing
    /// exporter does not stop the others.
    pub fn run(&mut self, exporters: &mut [Box<dyn CatalogExporter>]) -> RunSummary {
        let products = self.parse_catalog();

        let mut failed_exports = Vec::new();
        for exporter in exporters.iter_mut() {
            match exporter.export(&products) {
                Ok(()) => info!(
                    exporter = exporter.name(),
                    count = products.len(),
                    "export written"
                ),
                Err(e) => {
                    error!(exporter = exporter.name(), error = %e, "export failed");
                    failed_exports.push(exporter.name());
                }
            }
        }

        RunSummary {
            products,
            processed: self.accumulator.processed(),
            skipped: self.accumulator.skipped(),
            failed_exports,
        }
    }

    fn crawl(&mut self) -> Result<(), PipelineError> {
        let site_root =
            Url::parse(&self.config.site_root).map_err(|source| PipelineError::InvalidSiteRoot {
                url: self.config.site_root.clone(),
                source,
            })?;

        self.state.advance(PipelineState::Navigating);
        match self.config.template {
            SiteTemplate::MenuAjax => self.crawl_menu(&site_root),
            SiteTemplate::PagedListing => self.crawl_listing(&site_root),
        }
    }

    /// Home page -> categories -> product pages, pricing each size option
    fn crawl_menu(&mut self, site_root: &Url) -> Result<(), PipelineError> {
        info!(url = %site_root, "reading main page");
        let home = self.fetcher.fetch(site_root.as_str())?;

        let categories = match navigator::category_links(&home) {
            Ok(links) => links,
            Err(e) => {
                warn!("{e}");
                return Ok(());
            }
        };
        info!(count = categories.len(), "found category links");

        let extractor = AjaxVariantExtractor::new(self.fetcher.transport(), site_root.clone());
        let total = categories.len();

        for (index, category) in categories.iter().enumerate() {
            if self.accumulator.cap_reached() {
                info!("processing cap reached");
                break;
            }
            self.state.advance(PipelineState::Navigating);
            info!("reading {} page ({} of {})", category.name, index + 1, total);

            let category_url = match navigator::resolve(site_root, &category.url)
                .and_then(|url| Url::parse(&url).map_err(|_| FetchError::InvalidUrl(url)))
            {
                Ok(u) => u,
                Err(e) => {
                    warn!(category = %category.name, error = %e, "skipping category");
                    continue;
                }
            };

            let page = match self.fetcher.fetch(category_url.as_str()) {
                Ok(p) => p,
                Err(e) => {
                    warn!(category = %category.name, error = %e, "skipping category");
                    continue;
                }
            };

            let products = navigator::product_links(&page);
            if products.is_empty() {
                warn!(category = %category.name, "no product nodes found");
                continue;
            }
            info!(category = %category.name, count = products.len(), "found product nodes");

            for link in &products {
                if self.accumulator.cap_reached() {
                    break;
                }

                let url = match navigator::resolve(&category_url, &link.url) {
                    Ok(u) => u,
                    Err(e) => {
                        warn!(product = %link.name, error = %e, "skipping product");
                        self.accumulator.note_skipped();
                        continue;
                    }
                };

                if let Some(first) = self.accumulator.seen_url(&url).map(str::to_string) {
                    info!(
                        "skipping {} ({}) - already processed for category {}",
                        link.name, url, first
                    );
                    self.accumulator.note_skipped();
                    continue;
                }

                self.state.advance(PipelineState::Extracting);
                let context = PageContext {
                    url,
                    name: link.name.clone(),
                    category: category.name.clone(),
                };

                match fetch_and_extract(&self.fetcher, &extractor, &context) {
                    Ok(extracted) => {
                        self.state.advance(PipelineState::Accumulating);
                        for product in extracted {
                            self.accumulator.accept(product);
                        }
                    }
                    Err(e) => {
                        warn!(product = %link.name, url = %context.url, "skipping product: {e}");
                        self.accumulator.note_skipped();
                    }
                }
            }
        }

        Ok(())
    }

    /// `collections/all?page=N` until a page has nothing on it
    fn crawl_listing(&mut self, site_root: &Url) -> Result<(), PipelineError> {
        let extractor = ListingExtractor::new(self.config.listing_script_prefix.clone());

        for (number, url) in ListingPages::new(site_root)? {
            if self.accumulator.cap_reached() {
                info!("processing cap reached");
                break;
            }

            self.state.advance(PipelineState::Extracting);
            info!(page = number, "reading listing page");

            let context = PageContext {
                url,
                ..PageContext::default()
            };

            let products = match fetch_and_extract(&self.fetcher, &extractor, &context) {
                Ok(p) => p,
                Err(e) => {
                    warn!(page = number, "stopping at listing page: {e}");
                    break;
                }
            };

            if products.is_empty() {
                info!(page = number, "no products on page, listing exhausted");
                break;
            }
            debug!(page = number, count = products.len(), "found product records");

            self.state.advance(PipelineState::Accumulating);
            for product in products {
                if self.accumulator.cap_reached() {
                    break;
                }
                self.accumulator.accept(product);
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum PageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

fn fetch_and_extract<T: Transport, E: VariantExtractor>(
    fetcher: &PageFetcher<T>,
    extractor: &E,
    context: &PageContext,
) -> Result<Vec<ExtractedProduct>, PageError> {
    let page: Html = fetcher.fetch(&context.url)?;
    Ok(extractor.extract(&page, context)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use crate::test_support::FakeTransport;
    use rust_decimal::Decimal;
    use std::cell::RefCell;
    use std::rc::Rc;

    const ROOT: &str = "https://shop.test/";

    fn menu_config(max_products: usize) -> SkimmerConfig {
        SkimmerConfig {
            site_root: ROOT.to_string(),
            template: SiteTemplate::MenuAjax,
            max_products,
            ..SkimmerConfig::default()
        }
    }

    fn listing_config(max_products: usize) -> SkimmerConfig {
        SkimmerConfig {
            template: SiteTemplate::PagedListing,
            ..menu_config(max_products)
        }
    }

    /// Navigation bar with categories given in display order
    fn home_page(categories: &[(&str, &str)]) -> String {
        let items: String = categories
            .iter()
            .rev()
            .map(|(name, href)| {
                format!(r#"<li class="navPages-item has-children"><a href="{href}">{name}</a></li>"#)
            })
            .collect();
        format!(
            r#"<html><body><section class="main-nav-bar"><ul>{items}</ul></section></body></html>"#
        )
    }

    /// Category page with products given in walk order
    fn category_page(products: &[(&str, &str)]) -> String {
        let titles: String = products
            .iter()
            .rev()
            .map(|(name, href)| {
                format!(
                    r#"<h5 class="card-title product-item-title"><a href="{href}">{name}</a></h5>"#
                )
            })
            .collect();
        format!("<html><body><div class=\"grid\">{titles}</div></body></html>")
    }

    fn product_page(id: i64, price: &str) -> String {
        format!(
            r#"<html><body>
            <section class="productView" data-product-container data-product-id="{id}">
                <div class="product-price"><span class="price-value">{price}</span></div>
            </section>
            <div class="product-description"><p>Product {id}</p></div>
            </body></html>"#
        )
    }

    fn listing_page(records: &[(i64, i64, i64)]) -> String {
        let scripts: String = records
            .iter()
            .map(|(id, variant, cents)| {
                format!(
                    r#"<script>var product = {{"id": {id}, "type": "Bulk", "variants": [
                        {{"id": {variant}, "available": true, "name": "Item {id}",
                          "price": {cents}, "title": "5 lb"}}
                    ]}};</script>"#
                )
            })
            .collect();
        format!("<html><body>{scripts}<p>page</p></body></html>")
    }

    #[test]
    fn test_menu_walk_dedupes_across_categories() {
        let transport = FakeTransport::new()
            .page(ROOT, &home_page(&[("Nuts", "/nuts/"), ("Fruit", "/fruit/")]))
            .page(
                "https://shop.test/nuts/",
                &category_page(&[("Cashews", "/cashews/"), ("Almonds", "/almonds/")]),
            )
            .page(
                "https://shop.test/fruit/",
                &category_page(&[("Almonds", "/almonds/"), ("Goji", "/goji/")]),
            )
            .page("https://shop.test/cashews/", &product_page(1, "$9.00"))
            .page("https://shop.test/almonds/", &product_page(2, "$7.50"))
            .page("https://shop.test/goji/", &product_page(3, "$3.00"));

        let mut pipeline = CatalogPipeline::new(menu_config(0), &transport);
        let products = pipeline.parse_catalog();

        let summary: Vec<(&str, &str, i64)> = products
            .iter()
            .map(|p| (p.name.as_str(), p.category.as_str(), p.source_product_id))
            .collect();
        assert_eq!(
            summary,
            vec![("Cashews", "Nuts", 1), ("Almonds", "Nuts", 2), ("Goji", "Fruit", 3)]
        );

        let almond_fetches = transport
            .calls()
            .iter()
            .filter(|c| c.as_str() == "GET https://shop.test/almonds/")
            .count();
        assert_eq!(almond_fetches, 1);

        assert_eq!(products[1].display_price, Decimal::new(10, 0));
        assert_eq!(products[1].source_variant_id, crate::extractors::NO_VARIANT);
        assert_eq!(products[1].description, "<p>Product 2</p>");
        assert!(products.iter().all(|p| p.in_stock));
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    #[test]
    fn test_cap_stops_before_fetching_more_products() {
        let links: Vec<(String, String)> = (1..=5)
            .map(|i| (format!("Product {i}"), format!("/p{i}/")))
            .collect();
        let link_refs: Vec<(&str, &str)> =
            links.iter().map(|(n, h)| (n.as_str(), h.as_str())).collect();

        let mut transport = FakeTransport::new()
            .page(ROOT, &home_page(&[("All", "/all/")]))
            .page("https://shop.test/all/", &category_page(&link_refs));
        for i in 1..=5 {
            transport =
                transport.page(&format!("https://shop.test/p{i}/"), &product_page(i, "$2.00"));
        }

        let mut pipeline = CatalogPipeline::new(menu_config(2), &transport);
        let products = pipeline.parse_catalog();

        assert_eq!(products.len(), 2);
        assert!(transport.was_requested("https://shop.test/p2/"));
        assert!(!transport.was_requested("https://shop.test/p3/"));
    }

    #[test]
    fn test_failed_products_are_skipped() {
        let transport = FakeTransport::new()
            .page(ROOT, &home_page(&[("Nuts", "/nuts/")]))
            .page(
                "https://shop.test/nuts/",
                &category_page(&[
                    ("Missing", "/missing/"),
                    ("Broken", "/broken/"),
                    ("Pecans", "/pecans/"),
                ]),
            )
            .page("https://shop.test/broken/", "<html><body><p>Not a product</p></body></html>")
            .page("https://shop.test/pecans/", &product_page(8, "$12.00"));

        let mut pipeline = CatalogPipeline::new(menu_config(0), &transport);
        let products = pipeline.parse_catalog();

        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Pecans");
    }

    #[test]
    fn test_out_of_range_price_skips_only_that_product() {
        let transport = FakeTransport::new()
            .page(ROOT, &home_page(&[("Nuts", "/nuts/")]))
            .page(
                "https://shop.test/nuts/",
                &category_page(&[("Big", "/big/"), ("Ok", "/ok/")]),
            )
            .page(
                "https://shop.test/big/",
                &product_page(1, "$70000000000000000000000000000"),
            )
            .page("https://shop.test/ok/", &product_page(2, "$3.00"));

        let recording = RecordingExporter::default();
        let calls = recording.received.clone();
        let mut exporters: Vec<Box<dyn CatalogExporter>> = vec![Box::new(recording)];

        let summary = CatalogPipeline::new(menu_config(0), &transport).run(&mut exporters);

        assert_eq!(summary.products.len(), 1);
        assert_eq!(summary.products[0].name, "Ok");
        assert_eq!(summary.products[0].display_price, Decimal::new(4, 0));
        assert_eq!(summary.processed, 1);
        assert_eq!(*calls.borrow(), vec![1]);
    }

    #[test]
    fn test_failed_category_is_skipped() {
        let transport = FakeTransport::new()
            .page(ROOT, &home_page(&[("Gone", "/gone/"), ("Nuts", "/nuts/")]))
            .page("https://shop.test/nuts/", &category_page(&[("Pecans", "/pecans/")]))
            .page("https://shop.test/pecans/", &product_page(8, "$12.00"));

        let products = CatalogPipeline::new(menu_config(0), &transport).parse_catalog();
        assert_eq!(products.len(), 1);
    }

    #[test]
    fn test_menu_dead_end_returns_empty_list() {
        let transport =
            FakeTransport::new().page(ROOT, "<html><body><p>Maintenance</p></body></html>");

        let mut pipeline = CatalogPipeline::new(menu_config(0), &transport);
        assert!(pipeline.parse_catalog().is_empty());
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    #[test]
    fn test_unreachable_site_returns_empty_list() {
        let transport = FakeTransport::new();

        let mut pipeline = CatalogPipeline::new(menu_config(0), &transport);
        assert!(pipeline.parse_catalog().is_empty());
        assert_eq!(transport.calls(), vec![format!("GET {ROOT}")]);
    }

    #[test]
    fn test_invalid_site_root_returns_empty_list() {
        let transport = FakeTransport::new();
        let config = SkimmerConfig {
            site_root: "not a url".to_string(),
            ..menu_config(0)
        };

        assert!(CatalogPipeline::new(config, &transport).parse_catalog().is_empty());
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_listing_walk_stops_on_empty_page() {
        let transport = FakeTransport::new()
            .page(
                "https://shop.test/collections/all?page=1",
                &listing_page(&[(1, 11, 1299), (2, 21, 500)]),
            )
            .page(
                "https://shop.test/collections/all?page=2",
                &listing_page(&[(2, 21, 500), (3, 31, 0)]),
            )
            .page("https://shop.test/collections/all?page=3", &listing_page(&[]))
            .page("https://shop.test/collections/all?page=4", &listing_page(&[(4, 41, 100)]));

        let products = CatalogPipeline::new(listing_config(0), &transport).parse_catalog();

        let ids: Vec<i64> = products.iter().map(|p| p.source_product_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(products[0].source_price, Decimal::new(1299, 2));
        assert_eq!(products[0].category, "Bulk");
        assert_eq!(products[0].name, "Item 1");
        assert!(!transport.was_requested("https://shop.test/collections/all?page=4"));
    }

    #[test]
    fn test_listing_walk_stops_on_failed_page() {
        let transport = FakeTransport::new().page(
            "https://shop.test/collections/all?page=1",
            &listing_page(&[(1, 11, 1299)]),
        );

        let products = CatalogPipeline::new(listing_config(0), &transport).parse_catalog();
        assert_eq!(products.len(), 1);
        assert!(transport.was_requested("https://shop.test/collections/all?page=2"));
        assert!(!transport.was_requested("https://shop.test/collections/all?page=3"));
    }

    #[test]
    fn test_listing_cap() {
        let transport = FakeTransport::new()
            .page(
                "https://shop.test/collections/all?page=1",
                &listing_page(&[(1, 11, 100), (2, 21, 200)]),
            )
            .page(
                "https://shop.test/collections/all?page=2",
                &listing_page(&[(3, 31, 300), (4, 41, 400)]),
            )
            .page(
                "https://shop.test/collections/all?page=3",
                &listing_page(&[(5, 51, 500)]),
            );

        let products = CatalogPipeline::new(listing_config(3), &transport).parse_catalog();

        assert_eq!(products.len(), 3);
        assert!(!transport.was_requested("https://shop.test/collections/all?page=3"));
    }

    #[derive(Clone, Default)]
    struct RecordingExporter {
        received: Rc<RefCell<Vec<usize>>>,
        fail: bool,
    }

    impl CatalogExporter for RecordingExporter {
        fn name(&self) -> &'static str {
            if self.fail {
                "failing"
            } else {
                "recording"
            }
        }

        fn export(&mut self, products: &[Product]) -> Result<(), ExportError> {
            self.received.borrow_mut().push(products.len());
            if self.fail {
                return Err(ExportError::Io(std::io::Error::other("disk full")));
            }
            Ok(())
        }
    }

    #[test]
    fn test_run_hands_list_to_every_exporter() {
        let transport = FakeTransport::new()
            .page(ROOT, &home_page(&[("Nuts", "/nuts/")]))
            .page("https://shop.test/nuts/", &category_page(&[("Pecans", "/pecans/")]))
            .page("https://shop.test/pecans/", &product_page(8, "$12.00"));

        let failing = RecordingExporter {
            fail: true,
            ..RecordingExporter::default()
        };
        let recording = RecordingExporter::default();
        let failed_calls = failing.received.clone();
        let recorded_calls = recording.received.clone();

        let mut exporters: Vec<Box<dyn CatalogExporter>> =
            vec![Box::new(failing), Box::new(recording)];
        let summary = CatalogPipeline::new(menu_config(0), &transport).run(&mut exporters);

        assert_eq!(summary.products.len(), 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed_exports, vec!["failing"]);
        assert_eq!(*failed_calls.borrow(), vec![1]);
        assert_eq!(*recorded_calls.borrow(), vec![1]);
    }

    #[test]
    fn test_run_exports_even_when_walk_fails() {
        let transport = FakeTransport::new();
        let recording = RecordingExporter::default();
        let calls = recording.received.clone();

        let mut exporters: Vec<Box<dyn CatalogExporter>> = vec![Box::new(recording)];
        let summary = CatalogPipeline::new(menu_config(0), &transport).run(&mut exporters);

        assert!(summary.products.is_empty());
        assert_eq!(*calls.borrow(), vec![0]);
    }
}
