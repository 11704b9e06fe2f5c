//! Listing-page extraction from embedded product JSON
//!
//! Every product on a `collections/all` page is preceded by an inline script
//! assigning its full record, variants included, to a variable. No extra
//! requests are needed.

use scraper::Html;
use serde::Deserialize;
use tracing::warn;

use super::{ExtractedProduct, PageContext, RawVariant, SourcePrice, VariantExtractor};
use crate::error::ExtractError;
use crate::query::inner_text;

#[derive(Debug, Clone, Deserialize)]
pub struct ListingRecord {
    pub id: i64,
    #[serde(default)]
    pub description: String,
    /// Product type, used as the category
    #[serde(rename = "type", default)]
    pub product_type: String,
    #[serde(default)]
    pub variants: Vec<ListingVariant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingVariant {
    pub id: i64,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub name: String,
    /// Integer cents
    pub price: i64,
    /// Size / pricing unit
    #[serde(default)]
    pub title: String,
}

impl ListingRecord {
    fn into_product(self, url: &str) -> ExtractedProduct {
        let source_product_id = self.id;
        let name = self
            .variants
            .first()
            .map(|v| v.name.clone())
            .unwrap_or_default();

        let variants = self
            .variants
            .into_iter()
            .map(|variant| RawVariant {
                source_product_id,
                variant_id: variant.id,
                size_label: variant.title,
                price: SourcePrice::MinorUnits(variant.price),
                authoritative_in_stock: None,
                purchasable: Some(variant.available),
                name: Some(variant.name).filter(|n| !n.is_empty()),
            })
            .collect();

        ExtractedProduct {
            name,
            category: self.product_type,
            url: url.to_string(),
            source_product_id,
            description: self.description,
            variants,
        }
    }
}

/// Extractor for the paginated listing template
#[derive(Debug, Clone)]
pub struct ListingExtractor {
    script_prefix: String,
}

impl ListingExtractor {
    pub fn new(script_prefix: impl Into<String>) -> Self {
        Self {
            script_prefix: script_prefix.into(),
        }
    }

    /// Every script body on the page that starts with the record prefix,
    /// with the prefix and trailing semicolon removed
    fn record_payloads(&self, page: &Html) -> Vec<String> {
        let root = page.root_element();
        root.descendants()
            .filter_map(scraper::ElementRef::wrap)
            .filter(|el| el.value().name() == "script")
            .filter_map(|script| {
                let text = inner_text(script);
                let payload = text.trim().strip_prefix(self.script_prefix.as_str())?;
                Some(payload.trim().trim_end_matches(';').to_string())
            })
            .collect()
    }

    pub fn records(&self, page: &Html) -> Vec<ListingRecord> {
        self.record_payloads(page)
            .iter()
            .filter_map(|payload| match serde_json::from_str::<ListingRecord>(payload) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "skipping malformed product record");
                    None
                }
            })
            .collect()
    }
}

impl VariantExtractor for ListingExtractor {
    fn extract(
        &self,
        page: &Html,
        context: &PageContext,
    ) -> Result<Vec<ExtractedProduct>, ExtractError> {
        Ok(self
            .records(page)
            .into_iter()
            .map(|record| record.into_product(&context.url))
            .collect())
    }
}
