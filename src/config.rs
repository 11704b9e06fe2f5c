//! Run configuration

use serde::Deserialize;
use std::time::Duration;

/// Default storefront root
pub const DEFAULT_SITE_ROOT: &str = "https://www.omfoods.com";

/// Script prefix that introduces one embedded product record on listing pages
pub const DEFAULT_LISTING_SCRIPT_PREFIX: &str = "var product = ";

/// Stored procedure called once per product by the SQL export
pub const DEFAULT_SQL_PROC_NAME: &str = "sp_upsert_bulk_product";

/// Which of the two known site templates the target uses. Selected once
/// per run; pages are never sniffed individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteTemplate {
    /// Nested main menu, category pages, per-variant AJAX pricing
    #[default]
    MenuAjax,
    /// Paginated `collections/all` listing with embedded product JSON
    PagedListing,
}

/// Which export collaborators receive the final product list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportMode {
    /// Parse only, write nothing
    DryRun,
    Csv,
    Sql,
    #[default]
    Both,
}

impl ExportMode {
    pub fn writes_csv(self) -> bool {
        matches!(self, ExportMode::Csv | ExportMode::Both)
    }

    pub fn writes_sql(self) -> bool {
        matches!(self, ExportMode::Sql | ExportMode::Both)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SkimmerConfig {
    pub site_root: String,
    pub template: SiteTemplate,
    /// Stop after this many source products; 0 means no cap
    pub max_products: usize,
    /// Optional bound on each HTTP call; `None` keeps the client default
    pub request_timeout_secs: Option<u64>,
    pub user_agent: String,
    pub listing_script_prefix: String,
    pub export: ExportMode,
    pub output_dir: String,
    pub sql_proc_name: String,
}

impl SkimmerConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Processing cap, if one is configured
    pub fn cap(&self) -> Option<usize> {
        (self.max_products > 0).then_some(self.max_products)
    }
}

impl Default for SkimmerConfig {
    fn default() -> Self {
        Self {
            site_root: DEFAULT_SITE_ROOT.to_string(),
            template: SiteTemplate::default(),
            max_products: 0,
            request_timeout_secs: None,
            user_agent: concat!("catalog-skimmer/", env!("CARGO_PKG_VERSION")).to_string(),
            listing_script_prefix: DEFAULT_LISTING_SCRIPT_PREFIX.to_string(),
            export: ExportMode::default(),
            output_dir: ".".to_string(),
            sql_proc_name: DEFAULT_SQL_PROC_NAME.to_string(),
        }
    }
}
