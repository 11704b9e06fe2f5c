//! Variant extraction
//!
//! Each site template gets its own `VariantExtractor`:
//! - `AjaxVariantExtractor`: product page + one pricing POST per size option
//! - `ListingExtractor`: product records embedded as JSON in listing pages
//!
//! Both produce `ExtractedProduct`s holding `RawVariant`s; turning those into
//! canonical products is the normalizer's job.

mod ajax_extractor;
mod listing_extractor;

pub use ajax_extractor::*;
pub use listing_extractor::*;

use rust_decimal::Decimal;
use scraper::Html;

use crate::error::ExtractError;

/// Variant id used when a product has a single, unnamed variant
pub const NO_VARIANT: i64 = -1;

/// Price as found on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePrice {
    /// Full-precision currency units
    Units(Decimal),
    /// Integer cents
    MinorUnits(i64),
}

impl SourcePrice {
    pub fn to_decimal(self) -> Decimal {
        match self {
            SourcePrice::Units(value) => value,
            SourcePrice::MinorUnits(cents) => Decimal::new(cents, 2),
        }
    }
}

/// One purchasable variant as pulled off the page, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawVariant {
    pub source_product_id: i64,
    pub variant_id: i64,
    pub size_label: String,
    pub price: SourcePrice,
    /// Stock flag from the page-level product data, trusted over everything
    pub authoritative_in_stock: Option<bool>,
    /// Stock flag reported alongside this variant's price
    pub purchasable: Option<bool>,
    /// Variant-specific display name, when the source has one
    pub name: Option<String>,
}

/// A product page (or embedded record) with all its variants
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedProduct {
    pub name: String,
    pub category: String,
    pub url: String,
    pub source_product_id: i64,
    /// Description HTML with hyperlinks stripped
    pub description: String,
    pub variants: Vec<RawVariant>,
}

/// Where a page came from and what navigation already knows about it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContext {
    pub url: String,
    pub name: String,
    pub category: String,
}

/// Site-template specific extraction.
///
/// `extract` returns every product found on `page`. A product page yields
/// at most one product; a listing page yields one per embedded record.
/// `Err` means the page as a whole had to be skipped.
pub trait VariantExtractor {
    fn extract(
        &self,
        page: &Html,
        context: &PageContext,
    ) -> Result<Vec<ExtractedProduct>, ExtractError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_price_units() {
        assert_eq!(SourcePrice::MinorUnits(1299).to_decimal(), Decimal::new(1299, 2));
        assert_eq!(SourcePrice::MinorUnits(0).to_decimal(), Decimal::ZERO);
        assert_eq!(
            SourcePrice::Units(Decimal::new(45, 1)).to_decimal(),
            Decimal::new(45, 1)
        );
    }
}
