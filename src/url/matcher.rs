/// Checks if a host matches an allowed-domain pattern
///
/// Two pattern forms are supported:
/// 1. Exact match: "steamcommunity.com" matches only "steamcommunity.com"
/// 2. Wildcard match: "*.steampowered.com" matches the bare domain and any
///    subdomain, e.g. "store.steampowered.com"
///
/// # Examples
///
/// ```
/// use steam_scraper::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.steampowered.com", "store.steampowered.com"));
/// assert!(matches_wildcard("*.steampowered.com", "steampowered.com"));
/// assert!(!matches_wildcard("*.steampowered.com", "steamcommunity.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .map_or(false, |head| head.ends_with('.'))
        }
        None => candidate == pattern,
    }
}

/// Returns true if the host is covered by any of the patterns
///
/// An empty pattern list allows every host.
pub fn is_allowed_domain(host: &str, patterns: &[String]) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| matches_wildcard(p, host))
}
