//! Response handling
//!
//! Routes a classified response by its callback and produces records and
//! follow-up requests. Everything here is synchronous.

use crate::crawler::classifier::{classify, Batch, Classification};
use crate::crawler::interstitial::{resolve, InterstitialGuard};
use crate::crawler::links::extract_requests;
use crate::crawler::pagination::{build_next, resolve_context};
use crate::crawler::request::{Callback, FetchRequest, Response};
use crate::crawler::spiders::Spider;
use crate::extract::{load_product, load_review, Record};

/// What happened to an age gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// A resubmission request was produced
    Resolved,
    /// The per-request attempt cap was reached
    Abandoned,
}

/// Records and requests produced by one response
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub records: Vec<Record>,
    pub requests: Vec<FetchRequest>,
    pub gate: Option<GateOutcome>,
}

/// Handles a successful response
///
/// # Dispatch
///
/// | callback | classification | result |
/// |---|---|---|
/// | any | `Interstitial` | resubmission request (capped per request) |
/// | `Reviews` | `PaginatedBatch` | one review per card, next page request |
/// | `Reviews` | `TerminalItem` | nothing (empty page) |
/// | `Product` | `TerminalItem` / `PaginatedBatch` | one product record |
/// | `Listing` | `TerminalItem` / `PaginatedBatch` | link rule requests |
///
/// # Arguments
///
/// * `spider` - Supplies the link rules for listing pages
/// * `response` - The response to handle
/// * `guard` - Interstitial attempt counter shared across the run, keyed on
///   the page the gate stands in front of
pub fn handle_response(spider: &Spider, response: &Response, guard: &InterstitialGuard) -> ParseOutput {
    let classification = classify(response);
    let callback = response.request.callback();

    match (callback, classification) {
        (_, Classification::Interstitial) => handle_interstitial(response, guard),
        (Callback::Reviews, Classification::PaginatedBatch(batch)) => handle_reviews(response, batch),
        (Callback::Reviews, Classification::TerminalItem) => {
            tracing::debug!("No reviews on {}", response.url);
            ParseOutput::default()
        }
        (Callback::Product, _) => ParseOutput {
            records: vec![load_product(&response.text(), &response.url).into()],
            ..ParseOutput::default()
        },
        (Callback::Listing, _) => ParseOutput {
            requests: extract_requests(spider.rules(), &response.text(), &response.url),
            ..ParseOutput::default()
        },
    }
}

fn handle_interstitial(response: &Response, guard: &InterstitialGuard) -> ParseOutput {
    let fingerprint = response.request.origin_fingerprint();

    if !guard.admit(&fingerprint) {
        tracing::warn!(
            "Giving up on age check for {} after {} attempts",
            response.request.url(),
            guard.attempts(&fingerprint)
        );
        return ParseOutput {
            gate: Some(GateOutcome::Abandoned),
            ..ParseOutput::default()
        };
    }

    ParseOutput {
        requests: vec![resolve(response)],
        gate: Some(GateOutcome::Resolved),
        ..ParseOutput::default()
    }
}

fn handle_reviews(response: &Response, batch: Batch) -> ParseOutput {
    let context = resolve_context(response.request.context(), &response.url);

    let records: Vec<Record> = batch
        .fragments
        .iter()
        .enumerate()
        .map(|(order, fragment)| {
            load_review(fragment, context.product_id.as_deref(), context.page, order).into()
        })
        .collect();

    let requests: Vec<FetchRequest> = batch
        .continuation
        .map(|descriptor| build_next(&descriptor, &context))
        .into_iter()
        .collect();

    ParseOutput {
        records,
        requests,
        gate: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::request::ContextBag;
    use crate::crawler::spiders::Seed;
    use std::time::Duration;
    use url::Url;

    fn response(request: FetchRequest, final_url: &str, body: &str) -> Response {
        Response {
            url: Url::parse(final_url).unwrap(),
            status: 200,
            headers: vec![],
            body: body.as_bytes().to_vec(),
            request,
            from_cache: false,
            latency: Duration::ZERO,
        }
    }

    fn review_page(cards: usize, with_form: bool) -> String {
        let mut html = String::from("<html><body><div id=\"AppHubCards\">");
        for i in 0..cards {
            html.push_str(&format!(
                "<div class=\"apphub_Card\"><div class=\"title\">{}</div></div>",
                if i % 2 == 0 { "Recommended" } else { "Not Recommended" }
            ));
        }
        html.push_str("</div>");
        if with_form {
            html.push_str(
                "<form id=\"MoreContentForm1\" action=\"https://steamcommunity.com/app/416600/homecontent/\">\
                 <input type=\"hidden\" name=\"userreviewsoffset\" value=\"10\">\
                 <input type=\"hidden\" name=\"p\" value=\"2\">\
                 </form>",
            );
        }
        html.push_str("</body></html>");
        html
    }

    fn reviews_spider() -> Spider {
        Spider::reviews(Seed::Default).unwrap()
    }

    const SEED: &str = "https://steamcommunity.com/app/416600/reviews/?browsefilter=mostrecent&p=1";

    #[test]
    fn test_review_batch_records_and_continuation() {
        let request = FetchRequest::get(Url::parse(SEED).unwrap(), Callback::Reviews);
        let resp = response(request, SEED, &review_page(4, true));

        let output = handle_response(&reviews_spider(), &resp, &InterstitialGuard::new(3));

        assert_eq!(output.records.len(), 4);
        for (i, record) in output.records.iter().enumerate() {
            match record {
                Record::Review(review) => {
                    assert_eq!(review.page, Some(1));
                    assert_eq!(review.page_order, i);
                    assert_eq!(review.product_id.as_deref(), Some("416600"));
                }
                other => panic!("expected review, got {:?}", other),
            }
        }

        assert_eq!(output.requests.len(), 1);
        let next = &output.requests[0];
        assert_eq!(
            next.context(),
            &ContextBag::new(Some("416600".to_string()), Some(2))
        );
        assert_eq!(next.callback(), Callback::Reviews);
        assert!(output.gate.is_none());
    }

    #[test]
    fn test_last_review_page_has_no_next_request() {
        let request = FetchRequest::get(Url::parse(SEED).unwrap(), Callback::Reviews)
            .with_context(ContextBag::new(Some("416600".to_string()), Some(7)));
        let resp = response(request, "https://steamcommunity.com/app/416600/homecontent/?p=7", &review_page(2, false));

        let output = handle_response(&reviews_spider(), &resp, &InterstitialGuard::new(3));
        assert_eq!(output.records.len(), 2);
        assert!(output.requests.is_empty());
    }

    #[test]
    fn test_empty_review_page_emits_nothing() {
        let request = FetchRequest::get(Url::parse(SEED).unwrap(), Callback::Reviews);
        let resp = response(request, SEED, "<html><body></body></html>");

        let output = handle_response(&reviews_spider(), &resp, &InterstitialGuard::new(3));
        assert!(output.records.is_empty());
        assert!(output.requests.is_empty());
    }

    #[test]
    fn test_product_page_yields_product() {
        let url = "https://store.steampowered.com/app/620/";
        let request = FetchRequest::get(Url::parse(url).unwrap(), Callback::Product);
        let resp = response(request, url, "<div class=\"apphub_AppName\">Portal 2</div>");

        let spider = Spider::products(Seed::Default).unwrap();
        let output = handle_response(&spider, &resp, &InterstitialGuard::new(3));

        match output.records.as_slice() {
            [Record::Product(product)] => {
                assert_eq!(product.id.as_deref(), Some("620"));
                assert_eq!(product.app_name.as_deref(), Some("Portal 2"));
            }
            other => panic!("expected one product, got {:?}", other),
        }
    }

    #[test]
    fn test_listing_follows_rules_only() {
        let url = "https://store.steampowered.com/search/?sort_by=Released_DESC";
        let request = FetchRequest::get(Url::parse(url).unwrap(), Callback::Listing);
        let body = r#"
            <div id="search_result_container"><a href="/app/10/">a</a></div>
            <div class="search_pagination_right"><a href="/search/?sort_by=Released_DESC&page=2">2</a></div>
        "#;
        let resp = response(request, url, body);

        let spider = Spider::products(Seed::Default).unwrap();
        let output = handle_response(&spider, &resp, &InterstitialGuard::new(3));

        assert!(output.records.is_empty());
        let callbacks: Vec<Callback> = output.requests.iter().map(|r| r.callback()).collect();
        assert_eq!(callbacks, vec![Callback::Product, Callback::Listing]);
    }

    #[test]
    fn test_interstitial_capped_per_request() {
        let url = "https://store.steampowered.com/app/292030/";
        let request = FetchRequest::get(Url::parse(url).unwrap(), Callback::Product);
        let resp = response(request, "https://store.steampowered.com/app/292030/agecheck", "");
        let spider = Spider::products(Seed::Default).unwrap();
        let guard = InterstitialGuard::new(2);

        for _ in 0..2 {
            let output = handle_response(&spider, &resp, &guard);
            assert_eq!(output.gate, Some(GateOutcome::Resolved));
            assert_eq!(output.requests.len(), 1);
            assert!(output.records.is_empty());
        }

        let output = handle_response(&spider, &resp, &guard);
        assert_eq!(output.gate, Some(GateOutcome::Abandoned));
        assert!(output.requests.is_empty());
    }

    fn form_gate(sessionid: &str) -> String {
        format!(
            "<div id=\"agegate_box\">\
             <form action=\"https://store.steampowered.com/agecheckset/app/292030/\">\
             <input type=\"hidden\" name=\"sessionid\" value=\"{}\">\
             </form></div>",
            sessionid
        )
    }

    #[test]
    fn test_interstitial_cap_survives_rotating_form_tokens() {
        let gate_url = "https://store.steampowered.com/agecheck/app/292030/";
        let page = FetchRequest::get(
            Url::parse("https://store.steampowered.com/app/292030/").unwrap(),
            Callback::Product,
        );
        let spider = Spider::products(Seed::Default).unwrap();
        let guard = InterstitialGuard::new(2);

        let first = handle_response(&spider, &response(page.clone(), gate_url, &form_gate("s1")), &guard);
        assert_eq!(first.gate, Some(GateOutcome::Resolved));

        // The resubmission is gated again, with a fresh token each time
        let post_s1 = first.requests[0].clone();
        let second = handle_response(&spider, &response(post_s1.clone(), gate_url, &form_gate("s2")), &guard);
        assert_eq!(second.gate, Some(GateOutcome::Resolved));

        let post_s2 = second.requests[0].clone();
        assert_ne!(post_s1.fingerprint(), post_s2.fingerprint());

        let third = handle_response(&spider, &response(post_s2, gate_url, &form_gate("s3")), &guard);
        assert_eq!(third.gate, Some(GateOutcome::Abandoned));
        assert!(third.requests.is_empty());
        assert_eq!(guard.attempts(&page.fingerprint()), 2);
    }
}
