//! Age-gate detection and resolution
//!
//! The store interposes an age check in front of mature product pages in two
//! shapes. A form-type gate renders `#agegate_box form` at `/agecheck/app/<id>`
//! and expects a birth date to be posted. A button-type gate is reached by a
//! redirect to `/app/<id>/agecheck` and is cleared by re-requesting the page
//! with the mature-content cookie set.

use crate::crawler::request::{FetchRequest, Response};
use crate::url::Fingerprint;
use dashmap::DashMap;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

/// Birth date posted to form-type gates: 1 January 1955
pub const AGE_DAY: &str = "1";
pub const AGE_MONTH: &str = "1";
pub const AGE_YEAR: &str = "1955";

/// Cookies that mark the session as age-verified (1955-01-01 UTC)
pub const VERIFIED_COOKIES: [(&str, &str); 3] = [
    ("mature_content", "1"),
    ("birthtime", "-473385600"),
    ("lastagecheckage", "1-January-1955"),
];

/// Priority bump so resolutions run ahead of newly discovered pages
pub const RESOLUTION_PRIORITY_BOOST: i32 = 10;

static RE_AGE_GATE: OnceLock<Regex> = OnceLock::new();

fn age_gate_pattern() -> &'static Regex {
    RE_AGE_GATE.get_or_init(|| {
        Regex::new(r"/agecheck/app/[^/]+|/app/[^/]+/agecheck").expect("age gate pattern is valid")
    })
}

/// Returns true if the URL path is an age-gate path
pub fn is_interstitial(url: &url::Url) -> bool {
    age_gate_pattern().is_match(url.path())
}

/// Builds the request that gets past an age gate
///
/// A form-type gate is answered with a POST to the form's action carrying its
/// first input (usually the session id) and the synthetic birth date. Without
/// a form the original request URL is fetched again. Either way the request
/// carries the verification cookies, keeps the original callback and context,
/// skips both cache and dedup, and is scheduled ahead of regular work.
///
/// # Arguments
///
/// * `response` - The gate response
///
/// # Returns
///
/// The resubmission request. Resolving the same response twice yields equal
/// requests.
pub fn resolve(response: &Response) -> FetchRequest {
    let original = &response.request;

    let request = match extract_gate_form(response) {
        Some((action, mut fields)) => {
            tracing::debug!("Form-type age check triggered for {}", response.url);
            fields.extend([
                ("ageDay".to_string(), AGE_DAY.to_string()),
                ("ageMonth".to_string(), AGE_MONTH.to_string()),
                ("ageYear".to_string(), AGE_YEAR.to_string()),
            ]);
            FetchRequest::post_form(action, fields, original.callback())
        }
        None => {
            tracing::debug!("Button-type age check triggered for {}", original.url());
            FetchRequest::get(original.url().clone(), original.callback())
        }
    };

    VERIFIED_COOKIES
        .iter()
        .fold(request, |req, (name, value)| req.with_cookie(*name, *value))
        .with_context(original.context().clone())
        .with_priority(original.priority() + RESOLUTION_PRIORITY_BOOST)
        .with_origin(original.origin_fingerprint())
        .bypass_cache()
        .skip_dedup()
}

/// Finds the gate form's action and its first input
fn extract_gate_form(response: &Response) -> Option<(url::Url, Vec<(String, String)>)> {
    let document = Html::parse_document(&response.text());
    let form_selector = Selector::parse("#agegate_box form").ok()?;
    let input_selector = Selector::parse("input").ok()?;

    let form = document.select(&form_selector).next()?;
    let action = form.value().attr("action")?;
    let action = response.url.join(action).ok()?;

    let fields = form
        .select(&input_selector)
        .find_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .into_iter()
        .collect();

    Some((action, fields))
}

/// Caps how many times an age gate is resolved per originating request
///
/// A gate that keeps coming back (wrong cookies, changed markup) would
/// otherwise bounce between resolve and refetch forever.
pub struct InterstitialGuard {
    attempts: DashMap<Fingerprint, u32>,
    max_attempts: u32,
}

impl InterstitialGuard {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: DashMap::new(),
            max_attempts,
        }
    }

    /// Counts an attempt for `fingerprint`, returning false once the cap is reached
    pub fn admit(&self, fingerprint: &Fingerprint) -> bool {
        let mut count = self.attempts.entry(fingerprint.clone()).or_insert(0);
        if *count >= self.max_attempts {
            return false;
        }
        *count += 1;
        true
    }

    /// Attempts recorded so far for `fingerprint`
    pub fn attempts(&self, fingerprint: &Fingerprint) -> u32 {
        self.attempts.get(fingerprint).map_or(0, |count| *count)
    }
}
