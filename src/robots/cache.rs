//! Robots.txt caching implementation
//!
//! Policies are cached per origin (scheme, host and port) with expiration
//! after 24 hours.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Cached robots.txt data for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Creates a new CachedRobots instance stamped with the current time
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the cached robots.txt is stale (older than 24 hours)
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > Duration::hours(24)
    }
}

/// Per-origin robots.txt policies shared by all fetches
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: DashMap<String, CachedRobots>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached policy for an origin, unless missing or stale
    pub fn get(&self, origin: &str) -> Option<ParsedRobots> {
        self.entries
            .get(origin)
            .filter(|cached| !cached.is_stale())
            .map(|cached| cached.content.clone())
    }

    /// Stores a freshly fetched policy
    pub fn insert(&self, origin: &str, robots: ParsedRobots) {
        self.entries
            .insert(origin.to_string(), CachedRobots::new(robots));
    }

    /// Number of cached origins
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
