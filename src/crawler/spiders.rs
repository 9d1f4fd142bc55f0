//! Spider definitions: seeds, link rules and allowed domains per crawl kind

use crate::crawler::links::LinkRule;
use crate::crawler::request::{Callback, FetchRequest};
use crate::CrawlError;
use std::path::{Path, PathBuf};
use url::Url;

const STORE_BASE: &str = "https://store.steampowered.com/";
const COMMUNITY_BASE: &str = "https://steamcommunity.com/";

/// App whose reviews are crawled when no seed is given
pub const TEST_APP_ID: &str = "416600";

/// Which crawl to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiderKind {
    /// Store search listing and product pages
    Products,
    /// Community review listings
    Reviews,
}

/// Where the crawl starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seed {
    /// The spider's built-in start URL
    Default,
    /// A single app id
    SteamId(String),
    /// A file of newline-delimited URLs (reviews only)
    UrlFile(PathBuf),
}

/// A configured crawl: what to fetch first and how to follow links
#[derive(Debug, Clone)]
pub struct Spider {
    kind: SpiderKind,
    seed: Seed,
    store_base: Url,
    community_base: Url,
    allowed_domains: Vec<String>,
    rules: Vec<LinkRule>,
}

fn parse_base(base: &str) -> Result<Url, CrawlError> {
    Ok(Url::parse(base)?)
}

impl Spider {
    /// Crawls the store: the release-date search listing, or one app page
    /// when seeded with an app id
    pub fn products(seed: Seed) -> Result<Self, CrawlError> {
        Ok(Self {
            kind: SpiderKind::Products,
            seed,
            store_base: parse_base(STORE_BASE)?,
            community_base: parse_base(COMMUNITY_BASE)?,
            allowed_domains: vec!["*.steampowered.com".to_string()],
            rules: vec![
                LinkRule::new("/app/(.+)/", "#search_result_container", Callback::Product)?,
                LinkRule::new(r"page=(\d+)", ".search_pagination_right", Callback::Listing)?,
            ],
        })
    }

    /// Crawls community reviews: one app, a URL file, or the test app
    pub fn reviews(seed: Seed) -> Result<Self, CrawlError> {
        Ok(Self {
            kind: SpiderKind::Reviews,
            seed,
            store_base: parse_base(STORE_BASE)?,
            community_base: parse_base(COMMUNITY_BASE)?,
            allowed_domains: Vec::new(),
            rules: Vec::new(),
        })
    }

    /// Replaces the store origin seeds are built from
    pub fn with_store_base(mut self, base: Url) -> Self {
        self.store_base = base;
        self
    }

    /// Replaces the community origin seeds are built from
    pub fn with_community_base(mut self, base: Url) -> Self {
        self.community_base = base;
        self
    }

    /// Replaces the allowed-domain patterns (empty allows every host)
    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = domains;
        self
    }

    pub fn kind(&self) -> SpiderKind {
        self.kind
    }

    /// Name used for the cache directory and log lines
    pub fn name(&self) -> &'static str {
        match self.kind {
            SpiderKind::Products => "products",
            SpiderKind::Reviews => "reviews",
        }
    }

    pub fn rules(&self) -> &[LinkRule] {
        &self.rules
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    /// Reviews listing for an app on the configured community origin
    pub fn reviews_url(&self, app_id: &str) -> Result<Url, CrawlError> {
        Ok(self
            .community_base
            .join(&format!("app/{}/reviews/?browsefilter=mostrecent&p=1", app_id))?)
    }

    /// Builds the seed requests
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<FetchRequest>)` - Seeds in file/definition order
    /// * `Err(CrawlError::SeedFile)` - The URL file could not be read
    pub fn start_requests(&self) -> Result<Vec<FetchRequest>, CrawlError> {
        match (self.kind, &self.seed) {
            (SpiderKind::Products, Seed::SteamId(id)) => {
                let url = self.store_base.join(&format!("app/{}/", id))?;
                Ok(vec![FetchRequest::get(url, Callback::Product)])
            }
            (SpiderKind::Products, Seed::UrlFile(path)) => {
                Ok(read_url_file(path)?
                    .into_iter()
                    .map(|url| FetchRequest::get(url, Callback::Product))
                    .collect())
            }
            (SpiderKind::Products, Seed::Default) => {
                let url = self.store_base.join("search/?sort_by=Released_DESC")?;
                Ok(vec![FetchRequest::get(url, Callback::Listing)])
            }
            (SpiderKind::Reviews, Seed::SteamId(id)) => {
                Ok(vec![FetchRequest::get(self.reviews_url(id)?, Callback::Reviews)])
            }
            (SpiderKind::Reviews, Seed::UrlFile(path)) => Ok(read_url_file(path)?
                .into_iter()
                .map(|url| FetchRequest::get(url, Callback::Reviews))
                .collect()),
            (SpiderKind::Reviews, Seed::Default) => Ok(vec![FetchRequest::get(
                self.reviews_url(TEST_APP_ID)?,
                Callback::Reviews,
            )]),
        }
    }
}

/// Reads one URL per line, skipping blank lines and lines that do not parse
fn read_url_file(path: &Path) -> Result<Vec<Url>, CrawlError> {
    let content = std::fs::read_to_string(path).map_err(|source| CrawlError::SeedFile {
        path: path.display().to_string(),
        source,
    })?;

    let urls = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match Url::parse(line) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("Skipping seed '{}': {}", line, e);
                None
            }
        })
        .collect();

    Ok(urls)
}
