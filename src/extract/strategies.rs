//! Ordered price-extraction strategies
//!
//! Each strategy is one technique for recovering a numeric price from a
//! listing page. A strategy that finds nothing, or finds text that does
//! not parse as a number, is rejected and the caller falls through to the
//! next one in the family's table.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

lazy_static! {
    /// AliExpress embeds its offer state as a JSON blob in the page body
    static ref SALE_PRICE_RE: Regex =
        Regex::new(r#""salePrice":\s*\{"formattedValue":"\$([\d\.]+)"\}"#).unwrap();
    /// Dollar-prefixed amount inside a price element
    static ref DOLLAR_AMOUNT_RE: Regex = Regex::new(r"\$([\d,.]+)").unwrap();
    /// Bare amount inside a price element
    static ref AMOUNT_RE: Regex = Regex::new(r"([\d,.]+)").unwrap();
    /// Permissive `"price": ...` key/value search over the raw body
    static ref PRICE_KEY_RE: Regex = Regex::new(r#""price"\s*:\s*"?([\d.]+)"?"#).unwrap();
}

/// Which amount pattern a visible-text strategy matches against
#[derive(Debug, Clone, Copy)]
pub enum PricePattern {
    /// `$12,345.67`
    Dollar,
    /// `12,345.67`
    Plain,
}

/// One ordered technique for recovering a price from a page body
#[derive(Debug, Clone, Copy)]
pub enum Strategy {
    /// `content` attribute of a dedicated price meta tag
    MetaContent(&'static str),
    /// `offers.price` inside an embedded JSON-LD script block
    JsonLdOffers,
    /// Visible text of a known price element, matched against a pattern
    CssText {
        selector: &'static str,
        pattern: PricePattern,
    },
    /// AliExpress's embedded `salePrice` offer-state blob
    SalePriceJson,
}

impl Strategy {
    /// Try this strategy against a parsed document / raw body
    pub fn apply(&self, document: &Html, body: &str) -> Option<f64> {
        match self {
            Strategy::MetaContent(selector) => meta_content(document, selector),
            Strategy::JsonLdOffers => json_ld_offers(document),
            Strategy::CssText { selector, pattern } => css_text(document, selector, *pattern),
            Strategy::SalePriceJson => SALE_PRICE_RE
                .captures(body)
                .and_then(|caps| parse_price(&caps[1])),
        }
    }
}

fn meta_content(document: &Html, selector: &str) -> Option<f64> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .and_then(parse_price)
}

fn json_ld_offers(document: &Html) -> Option<f64> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    for script in document.select(&selector) {
        let text: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<serde_json::Value>(text.trim()) else {
            continue;
        };
        // First block with a parseable offers.price wins
        if let Some(price) = data
            .get("offers")
            .and_then(|offers| offers.get("price"))
            .and_then(price_value)
        {
            return Some(price);
        }
    }
    None
}

/// JSON-LD publishers emit prices as numbers or strings interchangeably
fn price_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_price(s),
        _ => None,
    }
}

fn css_text(document: &Html, selector: &str, pattern: PricePattern) -> Option<f64> {
    let selector = Selector::parse(selector).ok()?;
    let element = document.select(&selector).next()?;
    let text: String = element.text().collect();
    let re: &Regex = match pattern {
        PricePattern::Dollar => &DOLLAR_AMOUNT_RE,
        PricePattern::Plain => &AMOUNT_RE,
    };
    re.captures(&text).and_then(|caps| parse_price(&caps[1]))
}

/// Last resort: look for a `"price"` token anywhere in the raw body
pub fn key_value_fallback(body: &str) -> Option<f64> {
    PRICE_KEY_RE
        .captures(body)
        .and_then(|caps| parse_price(&caps[1]))
}

/// Strip thousands separators and parse as a float. Unparsable text
/// rejects the strategy, not the whole extraction.
fn parse_price(text: &str) -> Option<f64> {
    text.replace(',', "").parse::<f64>().ok()
}
