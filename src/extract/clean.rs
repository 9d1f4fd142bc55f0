//! Value cleaning applied to raw text pulled out of storefront markup

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const WHITESPACE: &[char] = &[' ', '\r', '\t', '\n'];
const PRICE_NOISE: &[char] = &[' ', '$', '\r', '\t', '\n'];

/// Trims spaces, tabs and line breaks from both ends
pub fn strip_text(value: &str) -> &str {
    value.trim_matches(WHITESPACE)
}

/// Parses a number that may contain thousands separators (`1,234.5`)
pub fn str_to_float(value: &str) -> Option<f64> {
    value.replace(',', "").trim().parse::<f64>().ok()
}

/// Parses a count, going through a float so `1,234.0` is accepted
pub fn str_to_int(value: &str) -> Option<u64> {
    str_to_float(value)
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f as u64)
}

/// `Recommended` means a positive review; any other label is negative
pub fn simplify_recommended(value: &str) -> bool {
    strip_text(value) == "Recommended"
}

/// Converts a storefront date to `YYYY-MM-DD`
///
/// Accepts `Mar 5, 2017` and `March 5, 2017`. Dates without a year
/// (`March 5`) are placed in the current year. Anything else is returned
/// unchanged.
pub fn standardize_date(value: &str) -> String {
    let value = strip_text(value);

    for fmt in ["%b %d, %Y", "%B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return date.format("%Y-%m-%d").to_string();
        }
    }

    let with_year = format!("{}, {}", value, Utc::now().year());
    for fmt in ["%b %d, %Y", "%B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&with_year, fmt) {
            return date.format("%Y-%m-%d").to_string();
        }
    }

    tracing::debug!("Could not process date {}", value);
    value.to_string()
}

/// A price: a number when the label parses, the label itself otherwise
/// ("Free to Play", "Free")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Value(f64),
    Label(String),
}

impl Amount {
    /// Cleans a price label; returns None when nothing is left
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = raw.trim_matches(PRICE_NOISE);
        if cleaned.is_empty() {
            return None;
        }
        Some(match str_to_float(cleaned) {
            Some(value) => Amount::Value(value),
            None => Amount::Label(cleaned.to_string()),
        })
    }
}
