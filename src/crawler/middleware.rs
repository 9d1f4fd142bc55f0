//! Request/response transform pipeline
//!
//! Stages run in a fixed order. A request stage either passes a (possibly
//! new) request on or drops it; a response stage either passes the response
//! on or drops it. A drop names the stage that made the decision.

use crate::crawler::request::{FetchRequest, Response};
use crate::url::is_allowed_domain;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Why a request or response left the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dropped {
    pub stage: &'static str,
    pub reason: String,
}

impl fmt::Display for Dropped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dropped by {}: {}", self.stage, self.reason)
    }
}

/// Transforms an outgoing request
pub trait RequestStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn process_request(&self, request: FetchRequest) -> Result<FetchRequest, Dropped>;
}

/// Transforms an incoming response
pub trait ResponseStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn process_response(&self, response: Response) -> Result<Response, Dropped>;
}

/// Ordered request and response stages
#[derive(Default)]
pub struct Pipeline {
    request_stages: Vec<Arc<dyn RequestStage>>,
    response_stages: Vec<Arc<dyn ResponseStage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard stage order: offsite, cookies, http-status
    pub fn standard(allowed_domains: Vec<String>) -> Self {
        let jar = Arc::new(CookieJarStage::new());
        Self::new()
            .with_request_stage(Arc::new(OffsiteStage::new(allowed_domains)))
            .with_request_stage(jar.clone())
            .with_response_stage(jar)
            .with_response_stage(Arc::new(HttpStatusStage))
    }

    pub fn with_request_stage(mut self, stage: Arc<dyn RequestStage>) -> Self {
        self.request_stages.push(stage);
        self
    }

    pub fn with_response_stage(mut self, stage: Arc<dyn ResponseStage>) -> Self {
        self.response_stages.push(stage);
        self
    }

    /// Runs a request through every request stage in order
    pub fn process_request(&self, request: FetchRequest) -> Result<FetchRequest, Dropped> {
        self.request_stages
            .iter()
            .try_fold(request, |req, stage| stage.process_request(req))
    }

    /// Runs a response through every response stage in order
    pub fn process_response(&self, response: Response) -> Result<Response, Dropped> {
        self.response_stages
            .iter()
            .try_fold(response, |resp, stage| stage.process_response(resp))
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.request_stages
            .iter()
            .map(|s| s.name())
            .chain(self.response_stages.iter().map(|s| s.name()))
            .collect()
    }
}

/// Drops requests whose host is outside the allowed domains
pub struct OffsiteStage {
    allowed_domains: Vec<String>,
}

impl OffsiteStage {
    /// An empty list allows every host
    pub fn new(allowed_domains: Vec<String>) -> Self {
        Self { allowed_domains }
    }
}

impl RequestStage for OffsiteStage {
    fn name(&self) -> &'static str {
        "offsite"
    }

    fn process_request(&self, request: FetchRequest) -> Result<FetchRequest, Dropped> {
        let host = request.domain().unwrap_or_default();
        if is_allowed_domain(&host, &self.allowed_domains) {
            Ok(request)
        } else {
            Err(Dropped {
                stage: self.name(),
                reason: format!("host '{}' is not allowed", host),
            })
        }
    }
}

/// Per-host cookie jar
///
/// Remembers cookies attached to dispatched requests and cookies set by
/// responses, and adds them to later requests for the same host. Cookies
/// already on a request win.
#[derive(Default)]
pub struct CookieJarStage {
    jars: DashMap<String, Vec<(String, String)>>,
}

impl CookieJarStage {
    pub fn new() -> Self {
        Self::default()
    }

    fn remember(&self, host: String, cookies: impl IntoIterator<Item = (String, String)>) {
        let mut jar = self.jars.entry(host).or_default();
        for (name, value) in cookies {
            match jar.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = value,
                None => jar.push((name, value)),
            }
        }
    }

    /// Cookies currently stored for a host
    pub fn cookies_for(&self, host: &str) -> Vec<(String, String)> {
        self.jars.get(host).map(|jar| jar.clone()).unwrap_or_default()
    }
}

/// Parses the name/value pair at the start of a `Set-Cookie` header
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

impl RequestStage for CookieJarStage {
    fn name(&self) -> &'static str {
        "cookies"
    }

    fn process_request(&self, request: FetchRequest) -> Result<FetchRequest, Dropped> {
        let Some(host) = request.domain() else {
            return Ok(request);
        };

        let missing: Vec<_> = self
            .cookies_for(&host)
            .into_iter()
            .filter(|(name, _)| request.cookie(name).is_none())
            .collect();
        let request = missing
            .into_iter()
            .fold(request, |req, (name, value)| req.with_cookie(name, value));

        self.remember(host, request.cookies().to_vec());
        Ok(request)
    }
}

impl ResponseStage for CookieJarStage {
    fn name(&self) -> &'static str {
        "cookies"
    }

    fn process_response(&self, response: Response) -> Result<Response, Dropped> {
        let set: Vec<_> = response
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
            .filter_map(|(_, value)| parse_set_cookie(value))
            .collect();

        if !set.is_empty() {
            if let Some(host) = response.url.host_str() {
                self.remember(host.to_lowercase(), set);
            }
        }
        Ok(response)
    }
}

/// Drops non-2xx responses so only successful pages are classified
pub struct HttpStatusStage;

impl ResponseStage for HttpStatusStage {
    fn name(&self) -> &'static str {
        "http-status"
    }

    fn process_response(&self, response: Response) -> Result<Response, Dropped> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(Dropped {
                stage: self.name(),
                reason: format!("HTTP {} for {}", response.status, response.url),
            })
        }
    }
}
