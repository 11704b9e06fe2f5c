//! Canonical product records
//!
//! Turns extracted variants into `Product`s: applies the fixed markup,
//! settles stock from competing signals and hands the description to the
//! first variant only.

use rust_decimal::Decimal;
use std::fmt;
use tracing::warn;

use crate::extractors::ExtractedProduct;

/// Retail price = source price / 0.75, i.e. a fixed 25% margin
pub const MARKUP_DIVISOR: Decimal = Decimal::from_parts(75, 0, 0, false, 2);

/// Decimal places kept on the display price
pub const DISPLAY_PRICE_SCALE: u32 = 3;

/// Normalized product record, one per variant
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub name: String,
    /// HTML fragment, only set on the first variant of a source product
    pub description: String,
    pub category: String,
    pub size: String,
    pub source_product_id: i64,
    pub source_variant_id: i64,
    pub source_url: String,
    pub source_price: Decimal,
    pub display_price: Decimal,
    pub in_stock: bool,
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID: {}, Variant ID: {}, Name: {}, Category: {}, Size: {}, \
             Source Price: ${:.2}, Price: ${:.2}, {}",
            self.source_product_id,
            self.source_variant_id,
            self.name,
            self.category,
            self.size,
            self.source_price,
            self.display_price,
            if self.in_stock { "In stock" } else { "OUT OF STOCK" }
        )
    }
}

/// `source / 0.75`, rounded half-to-even to three places. `None` when the
/// quotient does not fit in a `Decimal`.
pub fn display_price(source: Decimal) -> Option<Decimal> {
    source
        .checked_div(MARKUP_DIVISOR)
        .map(|price| price.round_dp(DISPLAY_PRICE_SCALE))
}

/// Page-level flag beats the per-variant flag, which beats "has a price"
pub fn resolve_stock(
    authoritative: Option<bool>,
    purchasable: Option<bool>,
    source_price: Decimal,
) -> bool {
    authoritative
        .or(purchasable)
        .unwrap_or(source_price > Decimal::ZERO)
}

/// One `Product` per variant, in extraction order. A variant whose price
/// cannot be marked up is dropped; the description then goes to the first
/// variant that survives.
pub fn normalize(extracted: ExtractedProduct) -> Vec<Product> {
    let ExtractedProduct {
        name,
        category,
        url,
        description,
        variants,
        ..
    } = extracted;

    let mut description = Some(description);

    variants
        .into_iter()
        .filter_map(|variant| {
            let source_price = variant.price.to_decimal();
            let Some(display_price) = display_price(source_price) else {
                warn!(
                    product_id = variant.source_product_id,
                    variant_id = variant.variant_id,
                    price = %source_price,
                    "skipping variant, price out of range"
                );
                return None;
            };

            Some(Product {
                name: variant.name.unwrap_or_else(|| name.clone()),
                description: description.take().unwrap_or_default(),
                category: category.clone(),
                size: variant.size_label,
                source_product_id: variant.source_product_id,
                source_variant_id: variant.variant_id,
                source_url: url.clone(),
                source_price,
                display_price,
                in_stock: resolve_stock(
                    variant.authoritative_in_stock,
                    variant.purchasable,
                    source_price,
                ),
            })
        })
        .collect()
}
