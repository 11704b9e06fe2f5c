//! Catalog skimmer
//!
//! Walks a storefront's product catalog and produces a deduplicated list of
//! products with a fixed retail markup applied:
//! - menu template: main navigation -> category pages -> product pages,
//!   with one pricing POST per size option
//! - listing template: paginated `collections/all` pages carrying product
//!   JSON inline
//!
//! The list can then be written as a CSV price list and a SQL import script.

pub mod config;
pub mod error;
pub mod export;
pub mod extractors;
pub mod fetcher;
pub mod logging;
pub mod navigator;
pub mod normalizer;
pub mod pipeline;
pub mod query;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{ExportMode, SiteTemplate, SkimmerConfig};
pub use error::{ExportError, ExtractError, FetchError, NavigationError, PipelineError};
pub use export::{CatalogExporter, CsvExporter, OutputLayout, SqlExporter};
pub use extractors::{
    AjaxVariantExtractor, ExtractedProduct, ListingExtractor, PageContext, RawVariant, SourcePrice,
    VariantExtractor,
};
pub use fetcher::{HttpTransport, PageFetcher, Transport};
pub use logging::init_logging;
pub use normalizer::{display_price, normalize, Product};
pub use pipeline::{CatalogPipeline, PipelineState, RunSummary};
