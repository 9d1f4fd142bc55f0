//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process:
//! - Seeding the frontier from the spider
//! - Dispatching throttled requests onto a bounded set of tasks
//! - Serving responses from the cache and storing fresh ones
//! - Handing responses to the parser and feeding follow-ups back in
//! - Emitting records and counting what happened
//!
//! Only the cache lookup and the fetch suspend; everything between a
//! response arriving and its follow-ups being queued is synchronous.

use crate::cache::{FilesystemCache, ResponseCache};
use crate::config::Config;
use crate::crawler::fetcher::{FetchError, Fetcher, HttpFetcher};
use crate::crawler::frontier::{Dispatch, Frontier};
use crate::crawler::handler::{handle_response, GateOutcome, ParseOutput};
use crate::crawler::interstitial::InterstitialGuard;
use crate::crawler::middleware::{Dropped, Pipeline};
use crate::crawler::request::FetchRequest;
use crate::crawler::spiders::Spider;
use crate::extract::Record;
use crate::output::{open_sink, Counter, CrawlStats, RecordSink, StatsSnapshot};
use crate::state::ThrottlePolicy;
use crate::{CrawlError, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Responses between progress lines
const PROGRESS_EVERY: u64 = 50;

/// State shared with every in-flight task
struct Shared {
    spider: Spider,
    frontier: Frontier,
    fetcher: Arc<dyn Fetcher>,
    cache: Option<Arc<dyn ResponseCache>>,
    pipeline: Pipeline,
    guard: InterstitialGuard,
    stats: CrawlStats,
    max_concurrent: usize,
}

/// How a finished crawl ended
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub stats: StatsSnapshot,

    /// The run was stopped by the cancellation token
    pub cancelled: bool,
}

/// How a dispatched request used its domain's throttle slot
#[derive(Debug, Clone, Copy, PartialEq)]
enum SlotUse {
    /// Never reached the network (cache hit, offsite drop, robots.txt denial)
    Unused,

    /// The server answered
    Answered { latency: Duration, status: u16 },

    /// The request went out but the transport failed
    Failed,
}

/// What one dispatched request turned into
struct TaskOutcome {
    domain: String,
    dispatched_at: Instant,
    slot: SlotUse,

    from_cache: bool,
    dropped: Option<Dropped>,
    error: Option<String>,
    output: ParseOutput,
}

impl TaskOutcome {
    fn new(domain: String, dispatched_at: Instant) -> Self {
        Self {
            domain,
            dispatched_at,
            slot: SlotUse::Unused,
            from_cache: false,
            dropped: None,
            error: None,
            output: ParseOutput::default(),
        }
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    shared: Shared,
    sink: Arc<dyn RecordSink>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `spider` - What to crawl
    /// * `sink` - Where extracted records go
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - The HTTP client could not be built
    pub fn new(config: &Config, spider: Spider, sink: Arc<dyn RecordSink>) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config)?);

        let cache: Option<Arc<dyn ResponseCache>> = if config.cache.enabled {
            Some(Arc::new(FilesystemCache::new(
                &config.cache.directory,
                spider.name(),
                config.cache.ignore_http_codes.clone(),
            )))
        } else {
            None
        };

        let shared = Shared {
            pipeline: Pipeline::standard(spider.allowed_domains().to_vec()),
            frontier: Frontier::new(ThrottlePolicy::from_config(config)),
            guard: InterstitialGuard::new(config.crawler.max_interstitial_attempts),
            stats: CrawlStats::new(),
            max_concurrent: config.crawler.max_concurrent_requests.max(1) as usize,
            spider,
            fetcher,
            cache,
        };

        Ok(Self { shared, sink })
    }

    /// Replaces the transport
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.shared.fetcher = fetcher;
        self
    }

    /// Replaces (or removes) the response cache
    pub fn with_cache(mut self, cache: Option<Arc<dyn ResponseCache>>) -> Self {
        self.shared.cache = cache;
        self
    }

    /// Fetches everything from the network
    pub fn without_cache(self) -> Self {
        self.with_cache(None)
    }

    /// Runs the crawl until the frontier drains or `cancel` fires
    ///
    /// 1. Seeds the frontier from the spider
    /// 2. Dispatches ready requests while a concurrency slot is free
    /// 3. Folds each finished task back in: throttle, stats, records,
    ///    follow-up requests
    ///
    /// On cancellation in-flight tasks are aborted and their records are
    /// discarded; records already emitted stay in the sink.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlOutcome)` - The run finished or was cancelled
    /// * `Err(CrawlError)` - Seeding failed or the sink rejected a record
    pub async fn run(self, cancel: CancellationToken) -> Result<CrawlOutcome> {
        let shared = Arc::new(self.shared);
        let sink = self.sink;
        let start_time = Instant::now();

        for request in shared.spider.start_requests()? {
            if !shared.frontier.enqueue(request) {
                shared.stats.incr(Counter::Duplicates);
            }
        }
        tracing::info!(
            "Starting {} crawl with {} seed requests",
            shared.spider.name(),
            shared.frontier.len()
        );

        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
        let mut cancelled = false;

        loop {
            let mut wait = None;
            while tasks.len() < shared.max_concurrent {
                let now = Instant::now();
                match shared.frontier.next_ready(now) {
                    Dispatch::Ready(request) => {
                        shared.stats.incr(Counter::Requests);
                        tasks.spawn(process(Arc::clone(&shared), request, now));
                    }
                    Dispatch::Wait(duration) => {
                        wait = Some(duration);
                        break;
                    }
                    Dispatch::Empty => break,
                }
            }

            if tasks.is_empty() && wait.is_none() {
                tracing::info!("Frontier is empty, crawl complete");
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::warn!("Crawl cancelled with {} requests in flight", tasks.len());
                    tasks.abort_all();
                    cancelled = true;
                    break;
                }
                Some(joined) = tasks.join_next() => match joined {
                    Ok(outcome) => {
                        if let Err(e) = absorb(&shared, sink.as_ref(), outcome, start_time) {
                            tasks.abort_all();
                            return Err(e);
                        }
                    }
                    Err(e) => {
                        tasks.abort_all();
                        return Err(CrawlError::Task(e.to_string()));
                    }
                },
                _ = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => {}
            }
        }

        sink.finalize()?;

        let stats = shared.stats.snapshot();
        tracing::info!(
            "Crawl {}: {} responses, {} products, {} reviews in {:?}",
            if cancelled { "cancelled" } else { "completed" },
            stats.responses,
            stats.products,
            stats.reviews,
            start_time.elapsed()
        );

        Ok(CrawlOutcome { stats, cancelled })
    }
}

/// Applies a finished task to the frontier, stats and sink
fn absorb(
    shared: &Shared,
    sink: &dyn RecordSink,
    outcome: TaskOutcome,
    start_time: Instant,
) -> Result<()> {
    let stats = &shared.stats;

    match outcome.slot {
        SlotUse::Answered { latency, status } => {
            shared.frontier.record_response(&outcome.domain, latency, status)
        }
        SlotUse::Failed => shared.frontier.record_failure(&outcome.domain),
        SlotUse::Unused => shared.frontier.refund(&outcome.domain, outcome.dispatched_at),
    }

    if outcome.from_cache {
        stats.incr(Counter::CacheHits);
    }

    if let Some(error) = outcome.error {
        stats.incr(Counter::FetchErrors);
        tracing::warn!("{}", error);
        return Ok(());
    }

    if let Some(dropped) = outcome.dropped {
        match dropped.stage {
            "offsite" => {
                stats.incr(Counter::Offsite);
                tracing::debug!("{}", dropped);
                // Never reached the network
                return Ok(());
            }
            "http-status" => {
                stats.incr(Counter::NonSuccess);
                tracing::warn!("{}", dropped.reason);
            }
            _ => tracing::debug!("{}", dropped),
        }
    }

    let responses = stats.incr(Counter::Responses);
    if responses % PROGRESS_EVERY == 0 {
        let rate = responses as f64 / start_time.elapsed().as_secs_f64().max(f64::EPSILON);
        tracing::info!(
            "Progress: {} responses, {} in frontier, {} items, {:.2} responses/sec",
            responses,
            shared.frontier.len(),
            stats.get(Counter::Products) + stats.get(Counter::Reviews),
            rate
        );
    }

    let ParseOutput {
        records,
        requests,
        gate,
    } = outcome.output;

    match gate {
        Some(GateOutcome::Resolved) => {
            stats.incr(Counter::InterstitialsResolved);
        }
        Some(GateOutcome::Abandoned) => {
            stats.incr(Counter::InterstitialsAbandoned);
        }
        None => {}
    }

    for record in &records {
        sink.emit(record)?;
        match record {
            Record::Product(_) => stats.incr(Counter::Products),
            Record::Review(_) => stats.incr(Counter::Reviews),
        };
    }

    for request in requests {
        if !shared.frontier.enqueue(request) {
            stats.incr(Counter::Duplicates);
        }
    }

    Ok(())
}

/// Takes one request through the pipeline, cache, transport and parser
async fn process(shared: Arc<Shared>, request: FetchRequest, dispatched_at: Instant) -> TaskOutcome {
    let mut outcome = TaskOutcome::new(request.domain().unwrap_or_default(), dispatched_at);

    let request = match shared.pipeline.process_request(request) {
        Ok(request) => request,
        Err(dropped) => {
            outcome.dropped = Some(dropped);
            return outcome;
        }
    };

    let cached = match &shared.cache {
        Some(cache) => match cache.get(&request).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("Cache lookup failed for {}: {}", request.url(), e);
                None
            }
        },
        None => None,
    };

    let response = match cached {
        Some(response) => {
            tracing::debug!("Cache hit for {}", request.url());
            outcome.from_cache = true;
            response
        }
        None => {
            let response = match shared.fetcher.fetch(&request).await {
                Ok(response) => response,
                Err(e) => {
                    if !matches!(e, FetchError::RobotsDenied(_)) {
                        outcome.slot = SlotUse::Failed;
                    }
                    outcome.error = Some(format!("Failed to fetch {}: {}", request.url(), e));
                    return outcome;
                }
            };
            outcome.slot = SlotUse::Answered {
                latency: response.latency,
                status: response.status,
            };

            if let Some(cache) = &shared.cache {
                if let Err(e) = cache.put(&request, &response).await {
                    tracing::warn!("Failed to cache {}: {}", request.url(), e);
                }
            }
            response
        }
    };

    let response = match shared.pipeline.process_response(response) {
        Ok(response) => response,
        Err(dropped) => {
            outcome.dropped = Some(dropped);
            return outcome;
        }
    };

    outcome.output = handle_response(&shared.spider, &response, &shared.guard);
    outcome
}

/// Runs a crawl writing to the sink selected by the configuration
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `spider` - What to crawl
/// * `output` - Overrides `output.path` when given
/// * `use_cache` - `false` fetches everything from the network
/// * `cancel` - Stops the crawl when cancelled
pub async fn run_crawl(
    config: &Config,
    spider: Spider,
    output: Option<&Path>,
    use_cache: bool,
    cancel: CancellationToken,
) -> Result<CrawlOutcome> {
    let sink = open_sink(&config.output, output)?;
    let mut coordinator = Coordinator::new(config, spider, sink)?;
    if !use_cache {
        coordinator = coordinator.without_cache();
    }
    coordinator.run(cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::request::{Callback, Response};
    use crate::crawler::spiders::Seed;
    use crate::output::OutputResult;
    use crate::url::strip_tracking;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use url::Url;

    /// Serves canned bodies by URL, 404 for anything else
    struct StubFetcher {
        pages: HashMap<String, (u16, String)>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn new(pages: &[(&str, u16, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, status, body)| (url.to_string(), (*status, body.to_string())))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, request: &FetchRequest) -> std::result::Result<Response, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (status, body) = self
                .pages
                .get(strip_tracking(request.url()).as_str())
                .cloned()
                .unwrap_or((404, String::new()));
            Ok(Response {
                url: request.url().clone(),
                status,
                headers: vec![],
                body: body.into_bytes(),
                request: request.clone(),
                from_cache: false,
                latency: Duration::from_millis(1),
            })
        }
    }

    #[derive(Default)]
    struct MemorySink {
        records: Mutex<Vec<Record>>,
        finalized: Mutex<bool>,
    }

    impl RecordSink for MemorySink {
        fn emit(&self, record: &Record) -> OutputResult<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn finalize(&self) -> OutputResult<()> {
            *self.finalized.lock().unwrap() = true;
            Ok(())
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.robots.obey = false;
        config.autothrottle.enabled = false;
        config.crawler.download_delay = 0;
        config.cache.enabled = false;
        config
    }

    const LISTING: &str = "https://store.steampowered.com/search/?sort_by=Released_DESC";
    const LISTING_2: &str = "https://store.steampowered.com/search/?sort_by=Released_DESC&page=2";

    fn listing_body() -> &'static str {
        r#"<div id="search_result_container">
             <a href="https://store.steampowered.com/app/10/?snr=1_7_7_230_150_1">a</a>
             <a href="https://store.steampowered.com/app/20/">b</a>
           </div>
           <div class="search_pagination_right">
             <a href="/search/?sort_by=Released_DESC&page=2">2</a>
           </div>"#
    }

    fn second_listing_body() -> &'static str {
        r#"<div id="search_result_container">
             <a href="https://store.steampowered.com/app/20/?snr=1_7_7_230_150_9">b again</a>
           </div>
           <div class="search_pagination_right">
             <a href="/search/?sort_by=Released_DESC&page=2">2</a>
           </div>"#
    }

    fn store_pages() -> Vec<(&'static str, u16, &'static str)> {
        vec![
            (LISTING, 200, listing_body()),
            (LISTING_2, 200, second_listing_body()),
            ("https://store.steampowered.com/app/10/", 200, "<div class=\"apphub_AppName\">Ten</div>"),
            ("https://store.steampowered.com/app/20/", 200, "<div class=\"apphub_AppName\">Twenty</div>"),
        ]
    }

    fn coordinator(fetcher: Arc<StubFetcher>, sink: Arc<MemorySink>) -> Coordinator {
        let spider = Spider::products(Seed::Default).unwrap();
        Coordinator::new(&test_config(), spider, sink)
            .unwrap()
            .with_fetcher(fetcher)
    }

    #[tokio::test]
    async fn test_listing_crawl_emits_products_once() {
        let fetcher = Arc::new(StubFetcher::new(&store_pages()));
        let sink = Arc::new(MemorySink::default());

        let outcome = coordinator(fetcher.clone(), sink.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(outcome.stats.products, 2);
        // app 20 under another snr and page 2 linking to itself
        assert_eq!(outcome.stats.duplicates, 2);
        assert_eq!(outcome.stats.requests, 4);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
        assert!(*sink.finalized.lock().unwrap());

        let mut names: Vec<String> = sink
            .records
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                Record::Product(p) => p.app_name.clone(),
                _ => None,
            })
            .collect();
        names.sort();
        assert_eq!(names, vec!["Ten".to_string(), "Twenty".to_string()]);
    }

    #[tokio::test]
    async fn test_non_success_is_counted_not_parsed() {
        let fetcher = Arc::new(StubFetcher::new(&[(LISTING, 503, listing_body())]));
        let sink = Arc::new(MemorySink::default());

        let outcome = coordinator(fetcher, sink.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stats.non_success, 1);
        assert_eq!(outcome.stats.requests, 1);
        assert!(sink.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offsite_links_are_dropped() {
        let body = r#"<div id="search_result_container">
                        <a href="https://example.com/app/1/">elsewhere</a>
                      </div>"#;
        let fetcher = Arc::new(StubFetcher::new(&[(LISTING, 200, body)]));
        let sink = Arc::new(MemorySink::default());

        let outcome = coordinator(fetcher.clone(), sink)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stats.offsite, 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_run_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let pages = store_pages();

        for expected_calls in [4, 0] {
            let fetcher = Arc::new(StubFetcher::new(&pages));
            let cache: Arc<dyn ResponseCache> =
                Arc::new(FilesystemCache::new(dir.path(), "products", vec![]));
            let sink = Arc::new(MemorySink::default());

            let outcome = coordinator(fetcher.clone(), sink)
                .with_cache(Some(cache))
                .run(CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(fetcher.calls.load(Ordering::SeqCst), expected_calls);
            assert_eq!(outcome.stats.products, 2);
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fetcher = Arc::new(StubFetcher::new(&[(LISTING, 200, listing_body())]));
        let sink = Arc::new(MemorySink::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = coordinator(fetcher, sink.clone()).run(cancel).await.unwrap();

        assert!(outcome.cancelled);
        assert!(*sink.finalized.lock().unwrap());
    }

    #[tokio::test]
    async fn test_reviews_seed_from_steam_id() {
        let seed = "https://steamcommunity.com/app/5/reviews/?browsefilter=mostrecent&p=1";
        let body = r#"<div class="apphub_Card"><div class="title">Recommended</div></div>
                      <div class="apphub_Card"><div class="title">Not Recommended</div></div>"#;
        let fetcher = Arc::new(StubFetcher::new(&[(seed, 200, body)]));
        let sink = Arc::new(MemorySink::default());

        let spider = Spider::reviews(Seed::SteamId("5".to_string())).unwrap();
        let outcome = Coordinator::new(&test_config(), spider, sink.clone())
            .unwrap()
            .with_fetcher(fetcher)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stats.reviews, 2);
        let records = sink.records.lock().unwrap();
        for (order, record) in records.iter().enumerate() {
            match record {
                Record::Review(review) => {
                    assert_eq!(review.product_id.as_deref(), Some("5"));
                    assert_eq!(review.page, Some(1));
                    assert_eq!(review.page_order, order);
                }
                other => panic!("expected review, got {:?}", other),
            }
        }
    }

    /// Fails every fetch with the error `make` builds
    struct FailingFetcher {
        make: fn(&FetchRequest) -> FetchError,
    }

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(&self, request: &FetchRequest) -> std::result::Result<Response, FetchError> {
            Err((self.make)(request))
        }
    }

    /// Dispatches one listing request through `fetcher` and absorbs the outcome
    async fn dispatch_once(fetcher: FailingFetcher) -> (Arc<Shared>, Instant) {
        let mut config = test_config();
        config.autothrottle.enabled = true;
        config.autothrottle.start_delay = 100;
        config.autothrottle.max_delay = 5_000;

        let spider = Spider::products(Seed::Default).unwrap();
        let sink = Arc::new(MemorySink::default());
        let coordinator = Coordinator::new(&config, spider, sink.clone())
            .unwrap()
            .with_fetcher(Arc::new(fetcher));
        let shared = Arc::new(coordinator.shared);

        shared
            .frontier
            .enqueue(FetchRequest::get(Url::parse(LISTING).unwrap(), Callback::Listing));
        let now = Instant::now();
        let request = match shared.frontier.next_ready(now) {
            Dispatch::Ready(request) => request,
            other => panic!("expected a ready request, got {:?}", other),
        };

        let outcome = process(shared.clone(), request, now).await;
        absorb(&shared, sink.as_ref(), outcome, now).unwrap();
        (shared, now)
    }

    #[tokio::test]
    async fn test_transport_failure_backs_off_domain() {
        let (shared, now) = dispatch_once(FailingFetcher {
            make: |request| FetchError::Connect(request.url().to_string()),
        })
        .await;

        assert_eq!(shared.stats.get(Counter::FetchErrors), 1);
        let delay = shared.frontier.domain_delay("store.steampowered.com").unwrap();
        assert!(delay >= Duration::from_millis(100), "delay lowered to {:?}", delay);

        shared
            .frontier
            .enqueue(FetchRequest::get(Url::parse(LISTING_2).unwrap(), Callback::Listing));
        assert!(matches!(shared.frontier.next_ready(now), Dispatch::Wait(_)));
    }

    #[tokio::test]
    async fn test_robots_denial_releases_slot() {
        let (shared, now) = dispatch_once(FailingFetcher {
            make: |request| FetchError::RobotsDenied(request.url().to_string()),
        })
        .await;

        assert_eq!(shared.stats.get(Counter::FetchErrors), 1);
        assert_eq!(
            shared.frontier.domain_delay("store.steampowered.com"),
            Some(Duration::from_millis(100))
        );

        shared
            .frontier
            .enqueue(FetchRequest::get(Url::parse(LISTING_2).unwrap(), Callback::Listing));
        assert!(matches!(shared.frontier.next_ready(now), Dispatch::Ready(_)));
    }
}
