//! Error types for the extraction pipeline
//!
//! Every failure is either recoverable for a single item (logged and
//! skipped), fatal to one branch of navigation, or fatal to the whole run.
//! None of them escape `CatalogPipeline::parse_catalog`.

use thiserror::Error;

/// Page Fetcher failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to retrieve anything from {url}")]
    Empty { url: String },

    #[error("cannot build a URL from {0:?}")]
    InvalidUrl(String),

    #[error("cannot set up HTTP client: {0}")]
    Client(String),
}

/// Strategy A navigation dead ends. Each one abandons the menu walk but
/// keeps whatever was already accumulated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("cannot locate main navigation section containing product links")]
    MainNavMissing,

    #[error("main navigation contains no category nodes")]
    NoCategories,

    #[error("unable to parse any URLs out of the category node(s)")]
    NoCategoryLinks,
}

/// Reasons a single product page is skipped
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("main product section not found")]
    MissingContainer,

    #[error("product id attribute missing")]
    MissingProductId,

    #[error("unable to parse product id from {0:?}")]
    InvalidProductId(String),

    #[error("cannot find {0} price element in the main product section")]
    MissingPriceElement(&'static str),
}

/// Faults that end the whole run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid site root {url:?}: {source}")]
    InvalidSiteRoot {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Export collaborator failures
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),
}
