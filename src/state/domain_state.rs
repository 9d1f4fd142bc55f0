use crate::config::Config;
use std::time::{Duration, Instant};

/// Throttling limits shared by every domain
///
/// Built once from the configuration and handed to each `DomainState` update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottlePolicy {
    /// Lower bound on the per-domain delay (`download-delay`)
    pub min_delay: Duration,

    /// Delay a domain starts with before any latency is observed
    pub start_delay: Duration,

    /// Upper bound on the per-domain delay
    pub max_delay: Duration,

    /// Average number of requests to keep in flight per domain
    pub target_concurrency: f64,

    /// Whether observed latency adjusts the delay at all
    pub adaptive: bool,
}

impl ThrottlePolicy {
    /// Builds the policy from the `[crawler]` and `[autothrottle]` sections
    pub fn from_config(config: &Config) -> Self {
        let min_delay = Duration::from_millis(config.crawler.download_delay);
        let throttle = &config.autothrottle;

        Self {
            min_delay,
            start_delay: Duration::from_millis(throttle.start_delay).max(min_delay),
            max_delay: Duration::from_millis(throttle.max_delay).max(min_delay),
            target_concurrency: throttle.target_concurrency,
            adaptive: throttle.enabled,
        }
    }

    /// The delay a freshly seen domain begins with
    pub fn initial_delay(&self) -> Duration {
        if self.adaptive {
            self.start_delay
        } else {
            self.min_delay
        }
    }
}

/// Tracks the state of a domain during crawling
///
/// This structure maintains per-domain information needed for rate limiting:
/// the current delay between requests and when the last request went out.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Number of requests made to this domain in the current crawl
    pub request_count: u32,

    /// Timestamp of the last request to this domain
    pub last_request_time: Option<Instant>,

    /// Timestamp of the request before the last one, restored on refund
    previous_request_time: Option<Instant>,

    /// Current minimum spacing between requests to this domain
    pub delay: Duration,
}

impl DomainState {
    /// Creates a new DomainState starting at the policy's initial delay
    pub fn new(policy: &ThrottlePolicy) -> Self {
        Self {
            request_count: 0,
            last_request_time: None,
            previous_request_time: None,
            delay: policy.initial_delay(),
        }
    }

    /// Checks if a request can be made to this domain
    ///
    /// # Arguments
    ///
    /// * `now` - The current time instant
    ///
    /// # Returns
    ///
    /// * `true` - If the current delay has elapsed since the last request
    /// * `false` - If the request should be delayed
    pub fn can_request(&self, now: Instant) -> bool {
        self.time_until_next_request(now).is_none()
    }

    /// Records that a request was made to this domain
    ///
    /// Updates the request count and last request time.
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.previous_request_time = self.last_request_time;
        self.last_request_time = Some(now);
    }

    /// Takes back the request recorded at `at` if it is still the latest one
    ///
    /// Used when a dispatched request was answered from the cache and never
    /// touched the network.
    pub fn refund_request(&mut self, at: Instant) {
        if self.last_request_time != Some(at) {
            return;
        }
        self.request_count = self.request_count.saturating_sub(1);
        self.last_request_time = self.previous_request_time.take();
    }

    /// Adjusts the delay from an observed download latency
    ///
    /// The new delay moves halfway toward `latency / target_concurrency` but
    /// never below that target, and is clamped to the policy bounds. A
    /// non-200 response can only hold or raise the delay, since error pages
    /// usually come back fast.
    ///
    /// # Arguments
    ///
    /// * `policy` - Throttling limits
    /// * `latency` - Time between sending the request and receiving the response
    /// * `status` - HTTP status of the response
    pub fn record_response(&mut self, policy: &ThrottlePolicy, latency: Duration, status: u16) {
        if !policy.adaptive {
            return;
        }

        let target = Duration::try_from_secs_f64(latency.as_secs_f64() / policy.target_concurrency)
            .unwrap_or(policy.max_delay);
        let averaged = (self.delay + target) / 2;
        let proposed = averaged.max(target).clamp(policy.min_delay, policy.max_delay);

        if status != 200 && proposed <= self.delay {
            return;
        }

        tracing::trace!(
            "Throttle delay {:?} -> {:?} (latency {:?}, status {})",
            self.delay,
            proposed,
            latency,
            status
        );
        self.delay = proposed;
    }

    /// Backs off after a request that went out but got no response
    ///
    /// Timeouts and refused connections carry no usable latency, so the delay
    /// doubles instead (at least to the start delay) within the policy bounds.
    /// The request itself stays recorded.
    pub fn record_failure(&mut self, policy: &ThrottlePolicy) {
        if !policy.adaptive {
            return;
        }

        let backed_off = self
            .delay
            .saturating_mul(2)
            .max(policy.start_delay)
            .clamp(policy.min_delay, policy.max_delay);

        tracing::trace!("Throttle delay {:?} -> {:?} (transport failure)", self.delay, backed_off);
        self.delay = backed_off;
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.delay {
            Some(self.delay - elapsed)
        } else {
            None
        }
    }
}
