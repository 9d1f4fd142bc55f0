//! State module for tracking crawl progress
//!
//! Per-domain throttle state consulted by the frontier before a request is
//! handed out.

mod domain_state;

pub use domain_state::{DomainState, ThrottlePolicy};
