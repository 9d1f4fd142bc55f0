//! Crawl statistics
//!
//! Counters are updated by the coordinator while the crawl runs and printed
//! once at the end.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one crawl run
#[derive(Debug, Default)]
pub struct CrawlStats {
    requests: AtomicU64,
    responses: AtomicU64,
    cache_hits: AtomicU64,
    duplicates: AtomicU64,
    offsite: AtomicU64,
    interstitials_resolved: AtomicU64,
    interstitials_abandoned: AtomicU64,
    non_success: AtomicU64,
    fetch_errors: AtomicU64,
    products: AtomicU64,
    reviews: AtomicU64,
}

/// Which counter to bump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Requests,
    Responses,
    CacheHits,
    Duplicates,
    Offsite,
    InterstitialsResolved,
    InterstitialsAbandoned,
    NonSuccess,
    FetchErrors,
    Products,
    Reviews,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub responses: u64,
    pub cache_hits: u64,
    pub duplicates: u64,
    pub offsite: u64,
    pub interstitials_resolved: u64,
    pub interstitials_abandoned: u64,
    pub non_success: u64,
    pub fetch_errors: u64,
    pub products: u64,
    pub reviews: u64,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Requests => &self.requests,
            Counter::Responses => &self.responses,
            Counter::CacheHits => &self.cache_hits,
            Counter::Duplicates => &self.duplicates,
            Counter::Offsite => &self.offsite,
            Counter::InterstitialsResolved => &self.interstitials_resolved,
            Counter::InterstitialsAbandoned => &self.interstitials_abandoned,
            Counter::NonSuccess => &self.non_success,
            Counter::FetchErrors => &self.fetch_errors,
            Counter::Products => &self.products,
            Counter::Reviews => &self.reviews,
        }
    }

    /// Increments a counter by one and returns the new value
    pub fn incr(&self, counter: Counter) -> u64 {
        self.add(counter, 1)
    }

    /// Adds `n` to a counter and returns the new value
    pub fn add(&self, counter: Counter, n: u64) -> u64 {
        self.counter(counter).fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counter(counter).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.get(Counter::Requests),
            responses: self.get(Counter::Responses),
            cache_hits: self.get(Counter::CacheHits),
            duplicates: self.get(Counter::Duplicates),
            offsite: self.get(Counter::Offsite),
            interstitials_resolved: self.get(Counter::InterstitialsResolved),
            interstitials_abandoned: self.get(Counter::InterstitialsAbandoned),
            non_success: self.get(Counter::NonSuccess),
            fetch_errors: self.get(Counter::FetchErrors),
            products: self.get(Counter::Products),
            reviews: self.get(Counter::Reviews),
        }
    }
}

impl StatsSnapshot {
    /// Share of responses served from the cache, as a percentage
    pub fn cache_hit_rate(&self) -> f64 {
        if self.responses == 0 {
            return 0.0;
        }
        (self.cache_hits as f64 / self.responses as f64) * 100.0
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &StatsSnapshot) {
    println!("=== Crawl Statistics ===\n");

    println!("Requests:");
    println!("  Dispatched: {}", stats.requests);
    println!("  Responses: {}", stats.responses);
    println!(
        "  Cache hits: {} ({:.1}%)",
        stats.cache_hits,
        stats.cache_hit_rate()
    );
    println!("  Duplicates dropped: {}", stats.duplicates);
    println!("  Offsite dropped: {}", stats.offsite);
    println!();

    println!("Age gates:");
    println!("  Resolved: {}", stats.interstitials_resolved);
    println!("  Abandoned: {}", stats.interstitials_abandoned);
    println!();

    if stats.non_success > 0 || stats.fetch_errors > 0 {
        println!("Errors:");
        println!("  Non-success responses: {}", stats.non_success);
        println!("  Fetch errors: {}", stats.fetch_errors);
        println!();
    }

    println!("Items:");
    println!("  Products: {}", stats.products);
    println!("  Reviews: {}", stats.reviews);
}
