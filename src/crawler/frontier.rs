//! Crawl frontier: pending-request queue plus the seen-set
//!
//! This module handles:
//! - At-most-once admission of each request fingerprint (atomic check-and-insert)
//! - Per-domain priority queues, FIFO within a priority
//! - Per-domain throttling via `DomainState`

use crate::crawler::request::FetchRequest;
use crate::state::{DomainState, ThrottlePolicy};
use crate::url::Fingerprint;
use dashmap::DashSet;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A request queued for fetching with ordering information
#[derive(Debug)]
struct QueuedRequest {
    request: FetchRequest,

    /// The domain of the request URL
    domain: String,

    /// Higher values are dispatched first
    priority: i32,

    /// Admission order, breaks ties within a priority
    seq: u64,
}

// BinaryHeap is a max-heap: highest priority first, then lowest sequence number
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

/// Outcome of asking the frontier for work
#[derive(Debug)]
pub enum Dispatch {
    /// A request whose domain is ready now
    Ready(FetchRequest),

    /// Requests are queued but every domain is still cooling down
    Wait(Duration),

    /// Nothing is queued
    Empty,
}

/// Pending requests, one heap per domain
///
/// Every heap in `by_domain` is non-empty; a domain is removed as soon as its
/// last request is popped.
#[derive(Default)]
struct DomainQueues {
    by_domain: HashMap<String, BinaryHeap<QueuedRequest>>,
    len: usize,
}

impl DomainQueues {
    fn push(&mut self, queued: QueuedRequest) {
        self.by_domain
            .entry(queued.domain.clone())
            .or_default()
            .push(queued);
        self.len += 1;
    }

    fn pop(&mut self, domain: &str) -> Option<QueuedRequest> {
        let heap = self.by_domain.get_mut(domain)?;
        let queued = heap.pop()?;
        if heap.is_empty() {
            self.by_domain.remove(domain);
        }
        self.len -= 1;
        Some(queued)
    }

    /// Head of every domain's heap
    fn heads(&self) -> impl Iterator<Item = &QueuedRequest> {
        self.by_domain.values().filter_map(|heap| heap.peek())
    }
}

/// Frontier manages the seen-set, the request queue and per-domain throttling
///
/// All methods take `&self`; the frontier is shared between the coordinator
/// and nothing else, but the seen-set insert is atomic so concurrent
/// discoveries of the same URL can never both be admitted.
pub struct Frontier {
    /// Fingerprints already admitted during this run
    seen: DashSet<Fingerprint>,

    queues: Mutex<DomainQueues>,

    domain_states: Mutex<HashMap<String, DomainState>>,

    policy: ThrottlePolicy,

    next_seq: AtomicU64,

    duplicates: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `policy` - Throttling limits applied to every domain
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self {
            seen: DashSet::new(),
            queues: Mutex::new(DomainQueues::default()),
            domain_states: Mutex::new(HashMap::new()),
            policy,
            next_seq: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        }
    }

    /// Adds a request to the frontier unless its fingerprint was already seen
    ///
    /// Requests marked `dont_filter` bypass the seen-set entirely (and do not
    /// add to it).
    ///
    /// # Returns
    ///
    /// * `true` - The request was queued
    /// * `false` - The request was a duplicate and was dropped
    pub fn enqueue(&self, request: FetchRequest) -> bool {
        if !request.dont_filter() && !self.seen.insert(request.fingerprint()) {
            self.duplicates.fetch_add(1, AtomicOrdering::Relaxed);
            tracing::debug!("Dropping duplicate request {}", request.url());
            return false;
        }

        let queued = QueuedRequest {
            domain: request.domain().unwrap_or_default(),
            priority: request.priority(),
            seq: self.next_seq.fetch_add(1, AtomicOrdering::Relaxed),
            request,
        };
        lock(&self.queues).push(queued);
        true
    }

    /// Pops the next request in priority order, ignoring throttling
    pub fn dequeue(&self) -> Option<FetchRequest> {
        let mut queues = lock(&self.queues);
        let domain = queues.heads().max()?.domain.clone();
        queues.pop(&domain).map(|queued| queued.request)
    }

    /// Gets the next request whose domain can accept a request at `now`
    ///
    /// Only the head of each domain's queue is examined, so the cost grows
    /// with the number of domains rather than the number of queued requests.
    /// Among the ready domains the head that comes first in priority order
    /// wins, and it is recorded against its domain immediately so the next
    /// call already sees the updated state.
    ///
    /// # Returns
    ///
    /// * `Dispatch::Ready` - A request that may be fetched now
    /// * `Dispatch::Wait` - The shortest time until some domain is ready
    /// * `Dispatch::Empty` - The queue is empty
    pub fn next_ready(&self, now: Instant) -> Dispatch {
        let mut queues = lock(&self.queues);
        if queues.len == 0 {
            return Dispatch::Empty;
        }

        let mut states = lock(&self.domain_states);
        let mut min_wait: Option<Duration> = None;

        let ready = queues
            .heads()
            .filter(|head| {
                let wait = states
                    .get(&head.domain)
                    .and_then(|state| state.time_until_next_request(now));
                if let Some(wait) = wait {
                    min_wait = Some(min_wait.map_or(wait, |m| m.min(wait)));
                }
                wait.is_none()
            })
            .max()
            .map(|head| head.domain.clone());

        let queued = match ready.and_then(|domain| queues.pop(&domain)) {
            Some(queued) => queued,
            // Small buffer so the domain is definitely ready on the next check
            None => return Dispatch::Wait(min_wait.unwrap_or_default() + Duration::from_millis(10)),
        };

        states
            .entry(queued.domain.clone())
            .or_insert_with(|| DomainState::new(&self.policy))
            .record_request(now);

        tracing::trace!("Dispatching {} (priority {})", queued.request.url(), queued.priority);
        Dispatch::Ready(queued.request)
    }

    /// Feeds an observed network latency back into the domain's throttle
    pub fn record_response(&self, domain: &str, latency: Duration, status: u16) {
        let mut states = lock(&self.domain_states);
        let state = states
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(&self.policy));
        state.record_response(&self.policy, latency, status);
    }

    /// Backs off a domain whose request failed in transport
    ///
    /// The slot taken at dispatch is kept, so the next request to the domain
    /// waits out the raised delay.
    pub fn record_failure(&self, domain: &str) {
        let mut states = lock(&self.domain_states);
        let state = states
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(&self.policy));
        state.record_failure(&self.policy);
    }

    /// Releases the slot a request took at `dispatched_at`
    ///
    /// Only for requests that never reached the network: cache hits, offsite
    /// drops and robots.txt denials.
    pub fn refund(&self, domain: &str, dispatched_at: Instant) {
        if let Some(state) = lock(&self.domain_states).get_mut(domain) {
            state.refund_request(dispatched_at);
        }
    }

    /// Current delay for a domain, if it has been seen
    pub fn domain_delay(&self, domain: &str) -> Option<Duration> {
        lock(&self.domain_states).get(domain).map(|s| s.delay)
    }

    /// Returns whether a fingerprint has been admitted
    pub fn has_seen(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Returns the number of queued requests
    pub fn len(&self) -> usize {
        lock(&self.queues).len
    }

    /// Returns whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of requests dropped as duplicates so far
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(AtomicOrdering::Relaxed)
    }
}
