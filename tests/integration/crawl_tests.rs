//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the store and community sites
//! and run full crawls end-to-end through the real HTTP fetcher.

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use steam_scraper::config::Config;
use steam_scraper::crawler::{Coordinator, CrawlOutcome, Seed, Spider};
use steam_scraper::output::JsonLinesSink;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration: no robots, no throttling, optional cache
fn create_test_config(cache_dir: Option<&Path>) -> Config {
    let mut config = Config::default();
    config.user_agent.name = "TestBot".to_string();
    config.robots.obey = false;
    config.autothrottle.enabled = false;
    config.crawler.download_delay = 0;
    config.crawler.request_timeout = 5;
    config.crawler.retry_times = 0;
    config.cache.enabled = cache_dir.is_some();
    if let Some(dir) = cache_dir {
        config.cache.directory = dir.to_string_lossy().into_owned();
    }
    config
}

fn base_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).expect("Failed to parse mock server URL")
}

async fn crawl(config: &Config, spider: Spider, output: &Path) -> CrawlOutcome {
    let sink = Arc::new(JsonLinesSink::create(output).expect("Failed to create sink"));
    Coordinator::new(config, spider, sink)
        .expect("Failed to create coordinator")
        .run(CancellationToken::new())
        .await
        .expect("Crawl failed")
}

fn read_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).expect("Invalid JSON line"))
        .collect()
}

fn review_cards(n: usize) -> String {
    (0..n)
        .map(|i| {
            format!(
                "<div class=\"apphub_Card\"><div class=\"title\">Recommended</div>\
                 <div class=\"apphub_CardTextContent\">review {}</div></div>",
                i
            )
        })
        .collect()
}

#[tokio::test]
async fn test_review_pagination_end_to_end() {
    let mock_server = MockServer::start().await;
    let uri = mock_server.uri();

    let first_page = format!(
        "<html><body><div id=\"AppHubCards\">{}</div>\
         <form id=\"MoreContentForm1\" action=\"{}/app/416600/homecontent/\">\
         <input type=\"hidden\" name=\"userreviewsoffset\" value=\"10\">\
         <input type=\"hidden\" name=\"p\" value=\"2\">\
         <input type=\"hidden\" name=\"browsefilter\" value=\"mostrecent\">\
         </form></body></html>",
        review_cards(3),
        uri
    );

    Mock::given(method("GET"))
        .and(path("/app/416600/reviews/"))
        .and(query_param("browsefilter", "mostrecent"))
        .respond_with(ResponseTemplate::new(200).set_body_string(first_page))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/app/416600/homecontent/"))
        .and(query_param("p", "2"))
        .and(query_param("userreviewsoffset", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_string(review_cards(2)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("reviews.jl");
    let spider = Spider::reviews(Seed::Default)
        .unwrap()
        .with_community_base(base_url(&mock_server));

    let outcome = crawl(&create_test_config(None), spider, &output).await;

    assert!(!outcome.cancelled);
    assert_eq!(outcome.stats.reviews, 5);
    assert_eq!(outcome.stats.requests, 2);

    let lines = read_lines(&output);
    assert_eq!(lines.len(), 5);

    let positions: Vec<(u64, u64)> = lines
        .iter()
        .map(|l| (l["page"].as_u64().unwrap(), l["page_order"].as_u64().unwrap()))
        .collect();
    assert_eq!(positions, vec![(1, 0), (1, 1), (1, 2), (2, 0), (2, 1)]);

    for line in &lines {
        assert_eq!(line["product_id"], "416600");
        assert_eq!(line["recommended"], true);
    }
}

#[tokio::test]
async fn test_age_gate_resolved_with_cookies() {
    let mock_server = MockServer::start().await;

    // Verified requests get the real page
    Mock::given(method("GET"))
        .and(path("/app/292030/"))
        .and(header_regex("cookie", "mature_content=1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<div class=\"apphub_AppName\">The Witcher 3</div>"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/app/292030/"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/app/292030/agecheck", mock_server.uri())),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/app/292030/agecheck"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<button>View Page</button>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("products.jl");
    let spider = Spider::products(Seed::SteamId("292030".to_string()))
        .unwrap()
        .with_store_base(base_url(&mock_server))
        .with_allowed_domains(vec![]);

    let outcome = crawl(&create_test_config(None), spider, &output).await;

    assert_eq!(outcome.stats.interstitials_resolved, 1);
    assert_eq!(outcome.stats.products, 1);

    let lines = read_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["id"], "292030");
    assert_eq!(lines[0]["app_name"], "The Witcher 3");
}

#[tokio::test]
async fn test_snr_variants_fetched_once_and_cached() {
    let mock_server = MockServer::start().await;
    let uri = mock_server.uri();

    let listing = format!(
        "<div id=\"search_result_container\">\
         <a href=\"{0}/app/10/?snr=1_7_7_230_150_1\">Ten</a>\
         <a href=\"{0}/app/20/\">Twenty</a>\
         </div>\
         <div class=\"search_pagination_right\"><a href=\"{0}/search/?sort_by=Released_DESC&page=2\">2</a></div>",
        uri
    );
    let second_listing = format!(
        "<div id=\"search_result_container\">\
         <a href=\"{0}/app/10/?snr=1_7_7_230_150_2\">Ten again</a>\
         </div>",
        uri
    );

    Mock::given(method("GET"))
        .and(path("/search/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(second_listing))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing))
        .expect(1)
        .mount(&mock_server)
        .await;

    for (app, name) in [("10", "Ten"), ("20", "Twenty")] {
        Mock::given(method("GET"))
            .and(path(format!("/app/{}/", app)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("<div class=\"apphub_AppName\">{}</div>", name)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let cache_dir = dir.path().join("httpcache");
    let config = create_test_config(Some(&cache_dir));
    let output = dir.path().join("products.jl");

    let spider = || {
        Spider::products(Seed::Default)
            .unwrap()
            .with_store_base(base_url(&mock_server))
            .with_allowed_domains(vec![])
    };

    let first = crawl(&config, spider(), &output).await;
    assert_eq!(first.stats.requests, 4);
    assert_eq!(first.stats.duplicates, 1);
    assert_eq!(first.stats.products, 2);
    assert_eq!(first.stats.cache_hits, 0);

    // Every response now comes from disk; the mocks' expect(1) checks the network
    let second = crawl(&config, spider(), &output).await;
    assert_eq!(second.stats.cache_hits, 4);
    assert_eq!(second.stats.products, 2);

    assert!(cache_dir.join("products").is_dir());
    assert_eq!(read_lines(&output).len(), 4);
}

#[tokio::test]
async fn test_age_gate_resubmission_bypasses_cache() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/app/292030/"))
        .and(header_regex("cookie", "birthtime=-473385600"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<div class=\"apphub_AppName\">Gated</div>"),
        )
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/app/292030/"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/app/292030/agecheck", mock_server.uri())),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/app/292030/agecheck"))
        .respond_with(ResponseTemplate::new(200).set_body_string("gate"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(Some(&dir.path().join("httpcache")));
    let output = dir.path().join("products.jl");

    for _ in 0..2 {
        let spider = Spider::products(Seed::SteamId("292030".to_string()))
            .unwrap()
            .with_store_base(base_url(&mock_server))
            .with_allowed_domains(vec![]);
        let outcome = crawl(&config, spider, &output).await;
        assert_eq!(outcome.stats.products, 1);
        assert_eq!(outcome.stats.interstitials_resolved, 1);
    }
}

#[tokio::test]
async fn test_robots_txt_respect() {
    let mock_server = MockServer::start().await;
    let uri = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /app/"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<div id=\"search_result_container\"><a href=\"{}/app/10/\">Ten</a></div>",
            uri
        )))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/app/10/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("should not be fetched"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(None);
    config.robots.obey = true;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("products.jl");
    let spider = Spider::products(Seed::Default)
        .unwrap()
        .with_store_base(base_url(&mock_server))
        .with_allowed_domains(vec![]);

    let outcome = crawl(&config, spider, &output).await;

    assert_eq!(outcome.stats.fetch_errors, 1);
    assert_eq!(outcome.stats.products, 0);
    assert!(read_lines(&output).is_empty());
}

#[tokio::test]
async fn test_cancel_abandons_in_flight_requests() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/app/416600/reviews/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(review_cards(2))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("reviews.jl");
    let sink = Arc::new(JsonLinesSink::create(&output).unwrap());
    let spider = Spider::reviews(Seed::Default)
        .unwrap()
        .with_community_base(base_url(&mock_server));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let outcome = Coordinator::new(&create_test_config(None), spider, sink)
        .unwrap()
        .run(cancel)
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(outcome.stats.reviews, 0);
    assert!(read_lines(&output).is_empty());
}
