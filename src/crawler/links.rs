//! Rule-driven link discovery for listing pages
//!
//! A rule pairs an allow pattern with the page region it applies to and the
//! callback the resulting requests are routed to. Rules are applied in order
//! and a URL claimed by an earlier rule is not offered to later ones.

use crate::crawler::request::{Callback, FetchRequest};
use crate::url::{canonicalize_url, strip_tracking};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// One link-following rule
#[derive(Debug, Clone)]
pub struct LinkRule {
    /// Pattern the absolute URL must match
    allow: Regex,

    /// CSS selector of the region links are taken from
    restrict_css: String,

    /// Handler for the followed pages
    callback: Callback,
}

impl LinkRule {
    /// Creates a rule
    ///
    /// # Arguments
    ///
    /// * `allow` - Regex searched for in each absolute link URL
    /// * `restrict_css` - Only anchors inside elements matching this selector count
    /// * `callback` - Callback for requests produced by this rule
    pub fn new(allow: &str, restrict_css: &str, callback: Callback) -> Result<Self, regex::Error> {
        Ok(Self {
            allow: Regex::new(allow)?,
            restrict_css: restrict_css.to_string(),
            callback,
        })
    }

    pub fn callback(&self) -> Callback {
        self.callback
    }

    /// Absolute links inside the rule's region that match its pattern
    fn matching_links(&self, document: &Html, base_url: &Url) -> Vec<Url> {
        let region = match Selector::parse(&self.restrict_css) {
            Ok(selector) => selector,
            Err(_) => {
                tracing::warn!("Invalid restrict selector '{}'", self.restrict_css);
                return Vec::new();
            }
        };
        let Ok(anchor) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        document
            .select(&region)
            .flat_map(|el| el.select(&anchor))
            .filter(|a| a.value().attr("download").is_none())
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| resolve_link(href, base_url))
            .filter(|url| self.allow.is_match(url.as_str()))
            .collect()
    }
}

/// Applies rules to a listing page and returns follow requests
///
/// Links are deduplicated per page on their canonical, tracking-free form;
/// the first rule to claim a URL decides its callback.
///
/// # Arguments
///
/// * `rules` - Rules in priority order
/// * `html` - The listing page body
/// * `base_url` - The page URL, for resolving relative links
///
/// # Returns
///
/// One GET request per distinct discovered link
pub fn extract_requests(rules: &[LinkRule], html: &str, base_url: &Url) -> Vec<FetchRequest> {
    let document = Html::parse_document(html);
    let mut claimed = HashSet::new();
    let mut requests = Vec::new();

    for rule in rules {
        for url in rule.matching_links(&document, base_url) {
            let key = canonicalize_url(&strip_tracking(&url));
            if claimed.insert(key) {
                requests.push(FetchRequest::get(url, rule.callback));
            }
        }
    }

    requests
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute)
}
