use crate::UrlError;
use url::Url;

/// Query parameter the storefront appends for internal click tracking
pub const TRACKING_PARAM: &str = "snr";

/// Parses a URL string and removes the tracking parameter
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only HTTP and HTTPS schemes
/// 3. Require a host
/// 4. Remove the `snr` query parameter, keeping every other parameter
///    in its original order and encoding
///
/// Scheme, host and path are left untouched.
///
/// # Examples
///
/// ```
/// use steam_scraper::url::normalize_url;
///
/// let url = normalize_url("https://store.steampowered.com/app/10/?snr=1_7_7&l=en").unwrap();
/// assert_eq!(url.as_str(), "https://store.steampowered.com/app/10/?l=en");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    Ok(strip_tracking(&url))
}

/// Removes the tracking parameter from an already parsed URL
///
/// Works on the raw query so the remaining pairs keep their exact order
/// and percent-encoding. An emptied query is removed entirely.
pub fn strip_tracking(url: &Url) -> Url {
    let mut stripped = url.clone();

    let Some(query) = url.query() else {
        return stripped;
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|segment| !segment.is_empty() && !is_tracking_segment(segment))
        .collect();

    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.set_query(Some(&kept.join("&")));
    }

    stripped
}

/// Returns the canonical form used for request identity
///
/// The fragment is dropped and query pairs are sorted by key, then value.
/// Hosts are already lowercased by the URL parser.
pub fn canonicalize_url(url: &Url) -> Url {
    let mut canonical = url.clone();
    canonical.set_fragment(None);

    if url.query().is_some() {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort();

        if pairs.is_empty() {
            canonical.set_query(None);
        } else {
            canonical.query_pairs_mut().clear().extend_pairs(pairs);
        }
    }

    canonical
}

/// Returns the first value of a query parameter, if present
pub fn query_parameter(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn is_tracking_segment(segment: &str) -> bool {
    let raw_key = segment.split_once('=').map_or(segment, |(k, _)| k);
    url::form_urlencoded::parse(raw_key.as_bytes())
        .next()
        .map_or(false, |(key, _)| key == TRACKING_PARAM)
}
