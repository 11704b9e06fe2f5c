//! Product-page extraction with per-option AJAX pricing
//!
//! A product page has one main section carrying the product id. If it
//! offers size options, each option is priced by POSTing to the store's
//! product-attributes endpoint; otherwise the single visible price is read
//! off the page.

use rust_decimal::Decimal;
use scraper::{ElementRef, Html};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{ExtractedProduct, PageContext, RawVariant, SourcePrice, VariantExtractor, NO_VARIANT};
use crate::error::{ExtractError, FetchError};
use crate::fetcher::Transport;
use crate::query::{
    attr_value, find_all, find_all_by_class, find_first_with_attribute, find_one_by_class,
    find_one_with_attribute, inner_text, strip_anchors,
};

pub const MAIN_PRODUCT_SECTION_ATTRIBUTE: &str = "data-product-container";
pub const PRODUCT_ID_ATTRIBUTE: &str = "data-product-id";
pub const SIZE_OPTIONS_ATTRIBUTE: &str = "data-product-option-change";
pub const PRODUCT_DESCRIPTION_CLASS: &str = "product-description";
pub const PRICE_CLASS: &str = "product-price";
pub const PRICE_VALUE_CLASS: &str = "price-value";
pub const SIZE_LABEL_CLASS: &str = "form-label-text";
pub const PRICING_ENDPOINT: &str = "/remote/v1/product-attributes/";

/// Inline script that carries the page-level product data
pub const PRODUCT_DATA_PREFIX: &str = r#"var BCData = {"product_attributes":"#;
const PRODUCT_DATA_ASSIGNMENT: &str = "var BCData = ";

const OUT_OF_STOCK_MARKER: &str = "out of stock";

/// One selectable size option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeOption {
    /// Form field name, e.g. `attribute[123]`
    pub name: String,
    pub value: String,
    pub label: String,
}

/// What the pricing endpoint says about one option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionPricing {
    pub price: Decimal,
    pub variant_id: i64,
    pub purchasable: bool,
}

#[derive(Debug, Deserialize)]
struct PricingResponse {
    data: PricingData,
}

#[derive(Debug, Deserialize)]
struct PricingData {
    price: PriceBlock,
    #[serde(rename = "variantId", default)]
    variant_id: Option<i64>,
    #[serde(default)]
    purchasable: bool,
}

#[derive(Debug, Deserialize)]
struct PriceBlock {
    without_tax: PriceValue,
}

#[derive(Debug, Deserialize)]
struct PriceValue {
    value: Decimal,
}

#[derive(Debug, Deserialize)]
struct ProductData {
    product_attributes: ProductAttributes,
}

#[derive(Debug, Deserialize)]
struct ProductAttributes {
    #[serde(default)]
    purchasable: Option<bool>,
}

/// Extractor for the menu-driven template
#[derive(Debug)]
pub struct AjaxVariantExtractor<'a, T> {
    transport: &'a T,
    site_root: Url,
}

impl<'a, T: Transport> AjaxVariantExtractor<'a, T> {
    pub fn new(transport: &'a T, site_root: Url) -> Self {
        Self {
            transport,
            site_root,
        }
    }

    fn pricing_url(&self, product_id: i64) -> Result<String, FetchError> {
        let path = format!("{PRICING_ENDPOINT}{product_id}");
        self.site_root
            .join(&path)
            .map(String::from)
            .map_err(|_| FetchError::InvalidUrl(path))
    }

    /// Price one option. Any failure skips just this option.
    fn price_option(&self, product_id: i64, option: &SizeOption) -> Option<OptionPricing> {
        let url = match self.pricing_url(product_id) {
            Ok(u) => u,
            Err(e) => {
                warn!(product_id, error = %e, "cannot build pricing URL");
                return None;
            }
        };

        let form = vec![
            ("action".to_string(), "add".to_string()),
            ("product_id".to_string(), product_id.to_string()),
            (option.name.clone(), option.value.clone()),
            ("qty[]".to_string(), "1".to_string()),
        ];

        let body = match self.transport.post_form(&url, &form) {
            Ok(b) => b,
            Err(e) => {
                warn!(product_id, option = %option.value, error = %e, "error getting pricing data");
                return None;
            }
        };

        if body.trim().is_empty() {
            warn!(product_id, option = %option.value, "retrieved no pricing data");
            return None;
        }

        match parse_pricing_response(&body) {
            Ok(pricing) => Some(pricing),
            Err(e) => {
                warn!(product_id, option = %option.value, error = %e, "malformed pricing data");
                None
            }
        }
    }
}

impl<T: Transport> VariantExtractor for AjaxVariantExtractor<'_, T> {
    fn extract(
        &self,
        page: &Html,
        context: &PageContext,
    ) -> Result<Vec<ExtractedProduct>, ExtractError> {
        let root = page.root_element();

        let container = find_first_with_attribute(root, "section", MAIN_PRODUCT_SECTION_ATTRIBUTE)
            .ok_or(ExtractError::MissingContainer)?;

        let description = product_description(page);
        let source_product_id = parse_product_id(container)?;
        let authoritative = authoritative_stock(page);
        let options = size_options(container);

        let variants = if options.is_empty() {
            // Single-size product: only the visible price is known, stock
            // follows from it
            let price = single_price(container)?;
            vec![RawVariant {
                source_product_id,
                variant_id: NO_VARIANT,
                size_label: String::new(),
                price: SourcePrice::Units(price),
                authoritative_in_stock: None,
                purchasable: None,
                name: None,
            }]
        } else {
            debug!(product_id = source_product_id, options = options.len(), "pricing size options");
            options
                .iter()
                .filter_map(|option| {
                    self.price_option(source_product_id, option).map(|pricing| RawVariant {
                        source_product_id,
                        variant_id: pricing.variant_id,
                        size_label: option.label.clone(),
                        price: SourcePrice::Units(pricing.price),
                        authoritative_in_stock: authoritative,
                        purchasable: Some(pricing.purchasable),
                        name: None,
                    })
                })
                .collect()
        };

        Ok(vec![ExtractedProduct {
            name: context.name.clone(),
            category: context.category.clone(),
            url: context.url.clone(),
            source_product_id,
            description,
            variants,
        }])
    }
}

/// Description HTML with links removed; empty when the page has no (or an
/// ambiguous) description block
pub fn product_description(page: &Html) -> String {
    find_one_by_class(page.root_element(), "div", PRODUCT_DESCRIPTION_CLASS, false)
        .map(|node| strip_anchors(&node.inner_html()))
        .unwrap_or_default()
}

pub fn parse_product_id(container: ElementRef<'_>) -> Result<i64, ExtractError> {
    let raw = container
        .value()
        .attr(PRODUCT_ID_ATTRIBUTE)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ExtractError::MissingProductId)?;

    raw.parse::<i64>()
        .map_err(|_| ExtractError::InvalidProductId(raw.to_string()))
}

/// Page-level purchasable flag from the inline product data script.
///
/// Anything that does not deserialize cleanly just means there is no
/// authoritative flag.
pub fn authoritative_stock(page: &Html) -> Option<bool> {
    find_all(page.root_element(), "script", "type", "text/javascript", false)
        .into_iter()
        .map(inner_text)
        .find(|text| starts_with_ignore_case(text.trim(), PRODUCT_DATA_PREFIX))
        .and_then(|text| {
            let json = text
                .trim()
                .get(PRODUCT_DATA_ASSIGNMENT.len()..)?
                .trim()
                .trim_end_matches(';');

            match serde_json::from_str::<ProductData>(json) {
                Ok(data) => data.product_attributes.purchasable,
                Err(e) => {
                    debug!(error = %e, "product data script did not deserialize");
                    None
                }
            }
        })
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Radio options inside the size selection group, if the page has exactly
/// one such group
pub fn size_options(container: ElementRef<'_>) -> Vec<SizeOption> {
    let group = match find_one_with_attribute(container, "div", SIZE_OPTIONS_ATTRIBUTE) {
        Some(g) => g,
        None => return Vec::new(),
    };

    find_all(group, "input", "type", "radio", true)
        .into_iter()
        .filter_map(|radio| {
            let name = attr_value(radio, "name");
            if name.is_empty() {
                warn!("size option without a name attribute");
                return None;
            }

            Some(SizeOption {
                name: name.to_string(),
                value: attr_value(radio, "value").to_string(),
                label: size_label(radio),
            })
        })
        .collect()
}

/// Size text from the label wrapping a radio button
fn size_label(radio: ElementRef<'_>) -> String {
    radio
        .parent()
        .and_then(ElementRef::wrap)
        .and_then(|label| {
            find_all_by_class(label, "span", SIZE_LABEL_CLASS, true)
                .into_iter()
                .next()
        })
        .map(|span| inner_text(span).trim().to_string())
        .unwrap_or_default()
}

/// Price of a product with no size options. An out-of-stock notice wins
/// over any number on the page; an unparseable price is zero.
pub fn single_price(container: ElementRef<'_>) -> Result<Decimal, ExtractError> {
    let price_block = find_one_by_class(container, "div", PRICE_CLASS, true)
        .ok_or(ExtractError::MissingPriceElement(PRICE_CLASS))?;

    let out_of_stock = price_block
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() == "p")
        .any(|p| inner_text(p).to_lowercase().contains(OUT_OF_STOCK_MARKER));

    if out_of_stock {
        return Ok(Decimal::ZERO);
    }

    let value = find_one_by_class(price_block, "span", PRICE_VALUE_CLASS, false)
        .ok_or(ExtractError::MissingPriceElement(PRICE_VALUE_CLASS))?;

    Ok(parse_currency(&inner_text(value)))
}

/// `$1,234.50` -> 1234.50; anything unparseable is zero
pub fn parse_currency(text: &str) -> Decimal {
    text.trim()
        .trim_start_matches('$')
        .trim()
        .replace(',', "")
        .parse::<Decimal>()
        .unwrap_or(Decimal::ZERO)
}

pub fn parse_pricing_response(body: &str) -> Result<OptionPricing, serde_json::Error> {
    let response: PricingResponse = serde_json::from_str(body)?;
    Ok(OptionPricing {
        price: response.data.price.without_tax.value,
        variant_id: response.data.variant_id.unwrap_or(NO_VARIANT),
        purchasable: response.data.purchasable,
    })
}
