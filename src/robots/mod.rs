//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching robots.txt files.
//! The HTTP transport consults it before every network fetch when `[robots] obey` is set.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::ParsedRobots;

use reqwest::Client;
use url::Url;

/// Fetches robots.txt for the origin of a URL
///
/// A missing file (4xx) allows everything. Server errors and network failures
/// also fall back to allow-all, with a warning, so an unreachable robots.txt
/// never stalls the crawl.
///
/// # Arguments
///
/// * `client` - The HTTP client used for regular fetches
/// * `url` - Any URL on the origin
///
/// # Returns
///
/// The parsed policy for the origin
pub async fn fetch_robots(client: &Client, url: &Url) -> ParsedRobots {
    let robots_url = match url.join("/robots.txt") {
        Ok(u) => u,
        Err(_) => return ParsedRobots::allow_all(),
    };

    tracing::debug!("Fetching {}", robots_url);

    match client.get(robots_url.clone()).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(body) => ParsedRobots::from_content(&body),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", robots_url, e);
                ParsedRobots::allow_all()
            }
        },
        Ok(response) if response.status().is_client_error() => ParsedRobots::allow_all(),
        Ok(response) => {
            tracing::warn!("{} returned HTTP {}", robots_url, response.status());
            ParsedRobots::allow_all()
        }
        Err(e) => {
            tracing::warn!("Failed to fetch {}: {}", robots_url, e);
            ParsedRobots::allow_all()
        }
    }
}

/// Cache key for a URL's robots.txt policy
pub fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}
