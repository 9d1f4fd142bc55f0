//! Pagination continuation builder
//!
//! Review pages are not linked by a plain "next" anchor. The server renders
//! a `MoreContentForm` whose action and hidden inputs describe the next
//! batch, and it does not echo back which page or product the batch belongs
//! to. That state travels in the request's `ContextBag` instead.

use crate::crawler::request::{Callback, ContextBag, FetchRequest};
use crate::extract::str_to_int;
use crate::url::query_parameter;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

static RE_APP_ID: OnceLock<Regex> = OnceLock::new();

fn app_id_pattern() -> &'static Regex {
    RE_APP_ID.get_or_init(|| Regex::new(r"app/(.+?)/").expect("app id pattern is valid"))
}

/// Action URL and fields of a "load more" form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationDescriptor {
    pub action: Url,
    pub fields: Vec<(String, String)>,
}

/// Extracts the app id from a store or community URL (`.../app/<id>/...`)
pub fn product_id_from_url(url: &Url) -> Option<String> {
    app_id_pattern()
        .captures(url.as_str())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Determines the product id and page index of a review response
///
/// Values threaded through the request context win. Otherwise the product id
/// comes from the URL path and the page index from its `p` query parameter,
/// which is how a seed URL (rather than a continuation hop) carries them.
///
/// # Arguments
///
/// * `context` - The context bag of the request that produced the response
/// * `url` - The response URL
///
/// # Returns
///
/// A context bag with whatever could be resolved; either field may be unset.
pub fn resolve_context(context: &ContextBag, url: &Url) -> ContextBag {
    let product_id = context
        .product_id
        .clone()
        .or_else(|| product_id_from_url(url));

    let page = context.page.or_else(|| {
        query_parameter(url, "p")
            .and_then(|p| str_to_int(&p))
            .and_then(|p| u32::try_from(p).ok())
    });

    ContextBag { product_id, page }
}

/// Builds the request for the next batch of a paginated list
///
/// The descriptor's fields replace the action URL's query. The new request
/// keeps the product id and advances the page index by one; when the current
/// page index is unknown (or already the largest representable one) the
/// next one is left unset.
///
/// # Arguments
///
/// * `descriptor` - Action and fields of the continuation form
/// * `current` - Resolved context of the page being handled
///
/// # Returns
///
/// A GET request routed back to the review handler
pub fn build_next(descriptor: &ContinuationDescriptor, current: &ContextBag) -> FetchRequest {
    let mut url = descriptor.action.clone();
    url.set_query(None);
    if !descriptor.fields.is_empty() {
        url.query_pairs_mut().extend_pairs(&descriptor.fields);
    }

    let context = ContextBag {
        product_id: current.product_id.clone(),
        page: current.page.and_then(|p| p.checked_add(1)),
    };

    FetchRequest::get(url, Callback::Reviews).with_context(context)
}
