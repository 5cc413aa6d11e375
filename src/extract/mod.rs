//! Supplier-aware price extraction
//!
//! Maps `(url, supplier, page body)` to a price. Each supplier family has
//! an ordered table of extraction strategies; the first one that yields a
//! parseable number wins. Extraction never fails the caller: every miss
//! degrades to `None` with a local debug log.

mod strategies;

use scraper::Html;
use strategies::{PricePattern, Strategy};

/// A class of storefront platforms sharing a page-structure convention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplierFamily {
    AliExpress,
    Newegg,
    /// Shopify storefronts and the dropshipping tools built on them
    ShopifyLike,
    WooCommerce,
    Generic,
}

const SHOPIFY_LIKE_KEYS: &[&str] = &[
    "shopify",
    "spocket",
    "dsers",
    "zendrop",
    "cjdropshipping",
    "modalyst",
    "autods",
    "shopify collective",
];

const ALIEXPRESS: &[Strategy] = &[
    Strategy::MetaContent(r#"meta[itemprop="price"]"#),
    Strategy::SalePriceJson,
];

const NEWEGG: &[Strategy] = &[
    Strategy::JsonLdOffers,
    Strategy::CssText {
        selector: "li.price-current",
        pattern: PricePattern::Dollar,
    },
];

const SHOPIFY_LIKE: &[Strategy] = &[
    Strategy::MetaContent(r#"meta[property="product:price:amount"]"#),
    Strategy::JsonLdOffers,
    Strategy::CssText {
        selector: "span.price",
        pattern: PricePattern::Plain,
    },
];

const WOOCOMMERCE: &[Strategy] = &[
    Strategy::MetaContent(r#"meta[property="product:price:amount"]"#),
    Strategy::JsonLdOffers,
    Strategy::CssText {
        selector: "span.woocommerce-Price-amount",
        pattern: PricePattern::Plain,
    },
];

const GENERIC: &[Strategy] = &[];

impl SupplierFamily {
    /// Resolve a family from the free-text supplier label, falling back
    /// to URL substrings. Matching is case-insensitive.
    pub fn resolve(supplier: &str, url: &str) -> Self {
        let supplier = supplier.to_lowercase();
        let url = url.to_lowercase();

        if supplier.contains("aliexpress") || url.contains("aliexpress.com") {
            return SupplierFamily::AliExpress;
        }
        if supplier.contains("newegg") || url.contains("newegg.com") {
            return SupplierFamily::Newegg;
        }
        if SHOPIFY_LIKE_KEYS.iter().any(|key| supplier.contains(key)) {
            return SupplierFamily::ShopifyLike;
        }
        if supplier.contains("woocommerce") {
            return SupplierFamily::WooCommerce;
        }
        SupplierFamily::Generic
    }

    fn strategies(self) -> &'static [Strategy] {
        match self {
            SupplierFamily::AliExpress => ALIEXPRESS,
            SupplierFamily::Newegg => NEWEGG,
            SupplierFamily::ShopifyLike => SHOPIFY_LIKE,
            SupplierFamily::WooCommerce => WOOCOMMERCE,
            SupplierFamily::Generic => GENERIC,
        }
    }
}

/// Extract a price from a listing page
///
/// Tries the supplier family's strategies in order, then the permissive
/// key/value fallback over the raw body. Returns `None` when nothing
/// parseable was found.
pub fn extract_price(url: &str, supplier: &str, body: &str) -> Option<f64> {
    let family = SupplierFamily::resolve(supplier, url);
    let document = Html::parse_document(body);

    for strategy in family.strategies() {
        if let Some(price) = strategy.apply(&document, body) {
            log::debug!("{:?} via {:?}: {} ({})", family, strategy, price, url);
            return Some(price);
        }
    }

    match strategies::key_value_fallback(body) {
        Some(price) => {
            log::debug!("{:?} via fallback: {} ({})", family, price, url);
            Some(price)
        }
        None => {
            log::debug!("No price found for {} ({:?})", url, family);
            None
        }
    }
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
