//! Request and response model
//!
//! A `FetchRequest` is immutable once issued: every follow-up (age-gate
//! resubmission, next review page, cookie-augmented copy) is a new value
//! built from the old one.

use crate::url::{extract_domain, fingerprint, Fingerprint};
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;
use url::Url;

/// HTTP method of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which handler a response is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    /// Search/listing page: only link rules apply
    Listing,
    /// Product detail page: yields one product record
    Product,
    /// Review page: yields review records and a continuation
    Reviews,
}

/// State the server does not echo back, threaded through one round trip
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextBag {
    pub product_id: Option<String>,
    pub page: Option<u32>,
}

impl ContextBag {
    pub fn new(product_id: Option<String>, page: Option<u32>) -> Self {
        Self { product_id, page }
    }
}

/// A request waiting to be fetched
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    url: Url,
    method: Method,
    form: Option<Vec<(String, String)>>,
    cookies: Vec<(String, String)>,
    context: ContextBag,
    callback: Callback,
    dont_cache: bool,
    dont_filter: bool,
    priority: i32,
    origin: Option<Fingerprint>,
}

impl FetchRequest {
    /// Creates a GET request routed to `callback`
    pub fn get(url: Url, callback: Callback) -> Self {
        Self {
            url,
            method: Method::Get,
            form: None,
            cookies: Vec::new(),
            context: ContextBag::default(),
            callback,
            dont_cache: false,
            dont_filter: false,
            priority: 0,
            origin: None,
        }
    }

    /// Creates a POST request carrying an urlencoded form
    pub fn post_form(url: Url, form: Vec<(String, String)>, callback: Callback) -> Self {
        Self {
            method: Method::Post,
            form: Some(form),
            ..Self::get(url, callback)
        }
    }

    pub fn with_context(mut self, context: ContextBag) -> Self {
        self.context = context;
        self
    }

    /// Sets a cookie, replacing any existing cookie of the same name
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.cookies.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value,
            None => self.cookies.push((name, value)),
        }
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Marks the request so the response cache is skipped in both directions
    pub fn bypass_cache(mut self) -> Self {
        self.dont_cache = true;
        self
    }

    /// Marks the request so the frontier's seen-set does not drop it
    pub fn skip_dedup(mut self) -> Self {
        self.dont_filter = true;
        self
    }

    /// Ties a derived request (an age-gate resubmission) to the page it stands in for
    pub fn with_origin(mut self, origin: Fingerprint) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn form(&self) -> Option<&[(String, String)]> {
        self.form.as_deref()
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn context(&self) -> &ContextBag {
        &self.context
    }

    pub fn callback(&self) -> Callback {
        self.callback
    }

    pub fn dont_cache(&self) -> bool {
        self.dont_cache
    }

    pub fn dont_filter(&self) -> bool {
        self.dont_filter
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Lowercase host of the target URL
    pub fn domain(&self) -> Option<String> {
        extract_domain(&self.url)
    }

    /// The urlencoded form body, empty for requests without a form
    pub fn body(&self) -> String {
        match &self.form {
            Some(fields) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields)
                .finish(),
            None => String::new(),
        }
    }

    /// Identity used by both the seen-set and the response cache
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(self.method.as_str(), &self.url, self.body().as_bytes())
    }

    /// Fingerprint of the page this request ultimately stands in for
    ///
    /// Equal to [`fingerprint`](Self::fingerprint) unless the request was
    /// derived from another one with [`with_origin`](Self::with_origin).
    pub fn origin_fingerprint(&self) -> Fingerprint {
        self.origin.clone().unwrap_or_else(|| self.fingerprint())
    }
}

/// A fetched (or cache-served) response
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after redirects
    pub url: Url,

    pub status: u16,

    pub headers: Vec<(String, String)>,

    pub body: Vec<u8>,

    /// The request that produced this response
    pub request: FetchRequest,

    pub from_cache: bool,

    /// Time spent waiting on the network (zero for cache hits)
    pub latency: Duration,
}

impl Response {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
