use super::{all_text, first_capture, first_own_text, own_text, pattern, select_all};
use crate::extract::clean::{simplify_recommended, standardize_date, str_to_float, str_to_int, strip_text};
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

struct ReviewPatterns {
    posted: Regex,
    hours: Regex,
    profile: Regex,
    products: Regex,
    helpful: Regex,
    unhelpful: Regex,
    funny: Regex,
}

static PATTERNS: OnceLock<ReviewPatterns> = OnceLock::new();

fn patterns() -> &'static ReviewPatterns {
    PATTERNS.get_or_init(|| ReviewPatterns {
        posted: pattern(r"Posted: (.+)"),
        hours: pattern(r"(.+) hrs"),
        profile: pattern(r".*/profiles/(.+)/"),
        products: pattern(r"([\d,]+) product"),
        helpful: pattern(r"([\d,]+) of"),
        unhelpful: pattern(r"of ([\d,]+)"),
        funny: pattern(r"([\d,]+).*funny"),
    })
}

/// One user review card
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    /// Page of the review listing the card was on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Position of the card on its page, from 0
    pub page_order: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Hours on record when the review was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub found_helpful: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub found_unhelpful: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub found_funny: Option<u64>,

    /// e.g. "Product received for free"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compensation: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Number of products the reviewer owns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<u64>,

    pub early_access: bool,
}

/// Extracts a review record from one review card
///
/// # Arguments
///
/// * `fragment` - Outer HTML of the card
/// * `product_id` - App the review belongs to, if known
/// * `page` - Page index of the listing, if known
/// * `page_order` - Position of the card on the page
pub fn load_review(
    fragment: &str,
    product_id: Option<&str>,
    page: Option<u32>,
    page_order: usize,
) -> ReviewRecord {
    let document = Html::parse_fragment(fragment);
    let root = document.root_element();
    let re = patterns();

    let text: Vec<&str> = select_all(root, ".apphub_CardTextContent")
        .into_iter()
        .flat_map(own_text)
        .map(strip_text)
        .collect();
    let text = strip_text(&text.join("\n")).to_string();

    let author_link = select_all(root, ".apphub_CardContentAuthorName a");
    let user_id = author_link
        .iter()
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| re.profile.captures(href))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    let username = author_link
        .iter()
        .flat_map(|a| own_text(*a))
        .map(strip_text)
        .find(|name| !name.is_empty())
        .map(str::to_string);

    let feedback = all_text(root, ".found_helpful");

    ReviewRecord {
        product_id: product_id.map(str::to_string),
        page,
        page_order,
        recommended: first_own_text(root, ".title").map(|t| simplify_recommended(&t)),
        date: first_capture(&re.posted, &all_own_text(root, ".date_posted"))
            .map(|d| standardize_date(&d)),
        text: Some(text).filter(|t| !t.is_empty()),
        hours: first_capture(&re.hours, &all_own_text(root, ".hours"))
            .and_then(|h| str_to_float(&h)),
        found_helpful: first_capture(&re.helpful, &feedback).and_then(|n| str_to_int(&n)),
        found_unhelpful: first_capture(&re.unhelpful, &feedback).and_then(|n| str_to_int(&n)),
        found_funny: first_capture(&re.funny, &feedback).and_then(|n| str_to_int(&n)),
        compensation: first_own_text(root, ".received_compensation"),
        username,
        user_id,
        products: first_capture(&re.products, &all_text(root, ".apphub_CardContentMoreLink"))
            .and_then(|n| str_to_int(&n)),
        early_access: !select_all(root, ".early_access_review").is_empty(),
    }
}

fn all_own_text(root: scraper::ElementRef<'_>, css: &str) -> Vec<String> {
    select_all(root, css)
        .into_iter()
        .flat_map(own_text)
        .map(|t| strip_text(t).to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
