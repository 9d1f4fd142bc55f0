use url::Url;

/// Extracts the lowercase host of a URL
///
/// Used as the key for per-domain throttling, cookie jars and robots policy.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use steam_scraper::url::extract_domain;
///
/// let url = Url::parse("https://Store.SteamPowered.com/app/10/").unwrap();
/// assert_eq!(extract_domain(&url), Some("store.steampowered.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
