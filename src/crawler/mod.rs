//! Crawler module for request dispatch and response handling
//!
//! This module contains the core crawling logic, including:
//! - The request/response model and its fingerprint
//! - The frontier: seen-set, priority queue and per-domain throttling
//! - HTTP fetching with robots.txt enforcement and retry logic
//! - Response classification, age-gate resolution and pagination
//! - Link rules and the spiders that own them
//! - Overall crawl coordination

mod classifier;
mod coordinator;
mod fetcher;
mod frontier;
mod handler;
mod interstitial;
mod links;
mod middleware;
mod pagination;
mod request;
mod spiders;

pub use classifier::{classify, Batch, Classification};
pub use coordinator::{run_crawl, Coordinator, CrawlOutcome};
pub use fetcher::{build_http_client, FetchError, Fetcher, HttpFetcher, MAX_REDIRECTS};
pub use frontier::{Dispatch, Frontier};
pub use handler::{handle_response, GateOutcome, ParseOutput};
pub use interstitial::{is_interstitial, resolve, InterstitialGuard};
pub use links::{extract_requests, resolve_link, LinkRule};
pub use middleware::{
    CookieJarStage, Dropped, HttpStatusStage, OffsiteStage, Pipeline, RequestStage, ResponseStage,
};
pub use pagination::{build_next, product_id_from_url, resolve_context, ContinuationDescriptor};
pub use request::{Callback, ContextBag, FetchRequest, Method, Response};
pub use spiders::{Seed, Spider, SpiderKind, TEST_APP_ID};
