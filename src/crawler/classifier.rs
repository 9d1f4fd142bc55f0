//! Response classification
//!
//! Every successful response falls into exactly one handling path. The
//! decision is a pure function of the response URL and body.

use crate::crawler::interstitial::is_interstitial;
use crate::crawler::pagination::ContinuationDescriptor;
use crate::crawler::request::Response;
use scraper::{ElementRef, Html, Selector};

/// Content fragments of one page of a paginated list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Outer HTML of each review card, in page order
    pub fragments: Vec<String>,

    /// Where the next page comes from; `None` on the last page
    pub continuation: Option<ContinuationDescriptor>,
}

/// Which handling path a response takes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Age gate in front of the real content
    Interstitial,

    /// A page of a form-paginated list
    PaginatedBatch(Batch),

    /// A standalone page
    TerminalItem,
}

/// Classifies a response
///
/// # Rules
///
/// 1. The URL path is an age-gate path: `Interstitial`, whatever the body says
/// 2. The body has a `MoreContentForm` or at least one review card:
///    `PaginatedBatch` with the cards and the form (if any)
/// 3. Anything else: `TerminalItem`
pub fn classify(response: &Response) -> Classification {
    if is_interstitial(&response.url) {
        return Classification::Interstitial;
    }

    let document = Html::parse_document(&response.text());

    let fragments = extract_fragments(&document);
    let continuation = extract_continuation(&document, &response.url);

    if fragments.is_empty() && continuation.is_none() {
        return Classification::TerminalItem;
    }

    Classification::PaginatedBatch(Batch {
        fragments,
        continuation,
    })
}

fn extract_fragments(document: &Html) -> Vec<String> {
    match Selector::parse(".apphub_Card") {
        Ok(selector) => document.select(&selector).map(|card| card.html()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Reads the "load more" form's action and its input name/value pairs
fn extract_continuation(document: &Html, base_url: &url::Url) -> Option<ContinuationDescriptor> {
    let selector = Selector::parse("form[id*='MoreContentForm']").ok()?;
    let form = document.select(&selector).next()?;

    let action = match form.value().attr("action") {
        Some(action) => base_url.join(action).ok()?,
        None => base_url.clone(),
    };

    let fields = form
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "input")
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    Some(ContinuationDescriptor { action, fields })
}
