use serde::Deserialize;

/// Main configuration structure
///
/// Every section is optional in the TOML file; missing sections take the
/// defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub autothrottle: AutoThrottleConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub robots: RobotsConfig,
    pub cache: CacheConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of requests in flight at once
    pub max_concurrent_requests: u32,

    /// Minimum time between requests to the same domain (milliseconds)
    pub download_delay: u64,

    /// How many times an age gate may be resolved for one request fingerprint
    pub max_interstitial_attempts: u32,

    /// Per-request timeout (seconds)
    pub request_timeout: u64,

    /// Extra attempts on timeouts, connection errors and 5xx responses
    pub retry_times: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 16,
            download_delay: 0,
            max_interstitial_attempts: 3,
            request_timeout: 30,
            retry_times: 2,
        }
    }
}

/// Adaptive throttling based on observed response latency
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AutoThrottleConfig {
    pub enabled: bool,

    /// Initial per-domain delay (milliseconds)
    pub start_delay: u64,

    /// Upper bound on the per-domain delay (milliseconds)
    pub max_delay: u64,

    /// Average number of requests to keep in flight per domain
    pub target_concurrency: f64,
}

impl Default for AutoThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_delay: 5_000,
            max_delay: 60_000,
            target_concurrency: 1.0,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    pub name: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            name: "Steam Scraper".to_string(),
        }
    }
}

/// robots.txt handling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RobotsConfig {
    pub obey: bool,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self { obey: true }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    pub enabled: bool,

    /// Root directory of the on-disk cache
    pub directory: String,

    /// Responses with these status codes are never stored
    pub ignore_http_codes: Vec<u16>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "httpcache".to_string(),
            ignore_http_codes: vec![301, 302, 303, 306, 307, 308],
        }
    }
}

/// Record sink format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jsonl,
    Sqlite,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,

    /// Path of the JSON-lines file or SQLite database
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jsonl,
            path: "output/items.jl".to_string(),
        }
    }
}
