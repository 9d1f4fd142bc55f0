//! Field extraction for product pages and review cards
//!
//! Every function here is pure: HTML in, typed record out. A field whose
//! markup is missing or malformed is left as `None` and the record survives.

mod clean;
mod product;
mod review;

pub use clean::{
    simplify_recommended, standardize_date, str_to_float, str_to_int, strip_text, Amount,
};
pub use product::{load_product, reviews_url_for, ProductRecord};
pub use review::{load_review, ReviewRecord};

use regex::Regex;
use scraper::{ElementRef, Selector};
use serde::Serialize;

/// One scraped item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Product(ProductRecord),
    Review(ReviewRecord),
}

impl Record {
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Product(_) => "product",
            Record::Review(_) => "review",
        }
    }
}

impl From<ProductRecord> for Record {
    fn from(record: ProductRecord) -> Self {
        Record::Product(record)
    }
}

impl From<ReviewRecord> for Record {
    fn from(record: ReviewRecord) -> Self {
        Record::Review(record)
    }
}

/// Elements under `root` matching `css`
fn select_all<'a>(root: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => root.select(&selector).collect(),
        Err(_) => {
            tracing::warn!("Invalid selector '{}'", css);
            Vec::new()
        }
    }
}

/// Text nodes that are direct children of `element`
fn own_text<'a>(element: ElementRef<'a>) -> impl Iterator<Item = &'a str> {
    element
        .children()
        .filter_map(|node| node.value().as_text().map(|text| &**text))
}

/// First non-blank direct text of any element matching `css`, stripped
fn first_own_text(root: ElementRef<'_>, css: &str) -> Option<String> {
    select_all(root, css)
        .into_iter()
        .flat_map(own_text)
        .map(strip_text)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

/// Every non-blank text node (at any depth) of elements matching `css`
fn all_text(root: ElementRef<'_>, css: &str) -> Vec<String> {
    select_all(root, css)
        .into_iter()
        .flat_map(|el| el.text())
        .map(strip_text)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect()
}

/// First capture group of `pattern` across `values`
fn first_capture(pattern: &Regex, values: &[String]) -> Option<String> {
    values
        .iter()
        .find_map(|value| pattern.captures(value))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Builds a regex from a literal pattern
fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("extraction pattern is valid")
}
