use crate::cache::{CacheError, CacheResult, ResponseCache};
use crate::crawler::{FetchRequest, Response};
use crate::url::Fingerprint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const META_FILE: &str = "meta.json";
const BODY_FILE: &str = "body";

/// Metadata stored next to each cached body
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    stored_at: DateTime<Utc>,
}

/// On-disk cache laid out as `<root>/<spider>/<fp[0..2]>/<fp>/{meta.json,body}`
///
/// Entries are written into a temporary sibling directory and renamed into
/// place, so a reader sees either a complete entry or none.
pub struct FilesystemCache {
    root: PathBuf,
    ignore_http_codes: Vec<u16>,
}

impl FilesystemCache {
    /// Creates a cache rooted at `<directory>/<spider_name>`
    ///
    /// # Arguments
    ///
    /// * `directory` - Cache root from configuration
    /// * `spider_name` - Separates entries of different spiders
    /// * `ignore_http_codes` - Responses with these statuses are never stored
    pub fn new(
        directory: impl AsRef<Path>,
        spider_name: &str,
        ignore_http_codes: Vec<u16>,
    ) -> Self {
        Self {
            root: directory.as_ref().join(spider_name),
            ignore_http_codes,
        }
    }

    /// Directory holding the entry for a fingerprint
    pub fn entry_dir(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root
            .join(fingerprint.prefix())
            .join(fingerprint.as_str())
    }

    async fn read_entry(
        &self,
        dir: &Path,
        fingerprint: &Fingerprint,
        request: &FetchRequest,
    ) -> CacheResult<Option<Response>> {
        let meta_bytes = match tokio::fs::read(dir.join(META_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: EntryMeta = serde_json::from_slice(&meta_bytes)?;
        let body = tokio::fs::read(dir.join(BODY_FILE)).await?;

        let url = Url::parse(&meta.url).map_err(|e| CacheError::Corrupt {
            fingerprint: fingerprint.to_string(),
            reason: format!("bad url '{}': {}", meta.url, e),
        })?;

        Ok(Some(Response {
            url,
            status: meta.status,
            headers: meta.headers,
            body,
            request: request.clone(),
            from_cache: true,
            latency: Duration::ZERO,
        }))
    }
}

#[async_trait]
impl ResponseCache for FilesystemCache {
    async fn get(&self, request: &FetchRequest) -> CacheResult<Option<Response>> {
        if request.dont_cache() {
            return Ok(None);
        }

        let fingerprint = request.fingerprint();
        let dir = self.entry_dir(&fingerprint);
        let hit = self.read_entry(&dir, &fingerprint, request).await?;
        if hit.is_some() {
            tracing::debug!("Cache hit for {} ({})", request.url(), fingerprint);
        }
        Ok(hit)
    }

    async fn put(&self, request: &FetchRequest, response: &Response) -> CacheResult<bool> {
        if request.dont_cache() || self.ignore_http_codes.contains(&response.status) {
            return Ok(false);
        }

        let fingerprint = request.fingerprint();
        let dir = self.entry_dir(&fingerprint);
        let parent = self.root.join(fingerprint.prefix());
        tokio::fs::create_dir_all(&parent).await?;

        let staging = parent.join(format!(".tmp-{}-{:016x}", fingerprint, rand::random::<u64>()));
        tokio::fs::create_dir(&staging).await?;

        let meta = EntryMeta {
            url: response.url.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            stored_at: Utc::now(),
        };
        tokio::fs::write(staging.join(META_FILE), serde_json::to_vec_pretty(&meta)?).await?;
        tokio::fs::write(staging.join(BODY_FILE), &response.body).await?;

        if let Err(e) = tokio::fs::rename(&staging, &dir).await {
            // Another task stored the same fingerprint first; keep its entry
            tokio::fs::remove_dir_all(&staging).await?;
            if !tokio::fs::try_exists(dir.join(META_FILE)).await.unwrap_or(false) {
                return Err(e.into());
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::Callback;
    use tempfile::TempDir;

    fn create_test_cache(dir: &TempDir) -> FilesystemCache {
        FilesystemCache::new(dir.path(), "reviews", vec![301, 302])
    }

    fn request(url: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(url).unwrap(), Callback::Reviews)
    }

    fn response_for(request: &FetchRequest, status: u16, body: &str) -> Response {
        Response {
            url: request.url().clone(),
            status,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: body.as_bytes().to_vec(),
            request: request.clone(),
            from_cache: false,
            latency: Duration::from_millis(120),
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let dir = TempDir::new().unwrap();
        let cache = create_test_cache(&dir);
        let req = request("https://steamcommunity.com/app/10/reviews/?p=1");

        assert!(cache.get(&req).await.unwrap().is_none());

        let stored = cache
            .put(&req, &response_for(&req, 200, "<html>reviews</html>"))
            .await
            .unwrap();
        assert!(stored);

        let hit = cache.get(&req).await.unwrap().unwrap();
        assert!(hit.from_cache);
        assert_eq!(hit.status, 200);
        assert_eq!(hit.text(), "<html>reviews</html>");
        assert_eq!(hit.header("content-type"), Some("text/html"));
        assert_eq!(hit.latency, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_layout_uses_fingerprint_prefix() {
        let dir = TempDir::new().unwrap();
        let cache = create_test_cache(&dir);
        let req = request("https://steamcommunity.com/app/10/reviews/?p=1");
        cache.put(&req, &response_for(&req, 200, "x")).await.unwrap();

        let fp = req.fingerprint();
        let entry = dir.path().join("reviews").join(&fp.as_str()[..2]).join(fp.as_str());
        assert_eq!(cache.entry_dir(&fp), entry);
        assert!(entry.join("meta.json").exists());
        assert!(entry.join("body").exists());
    }

    #[tokio::test]
    async fn test_tracking_variant_hits_same_entry() {
        let dir = TempDir::new().unwrap();
        let cache = create_test_cache(&dir);

        let plain = request("https://store.steampowered.com/app/10/");
        cache.put(&plain, &response_for(&plain, 200, "product")).await.unwrap();

        let tracked = request("https://store.steampowered.com/app/10/?snr=1_7_7_230_150_1");
        let hit = cache.get(&tracked).await.unwrap().unwrap();
        assert_eq!(hit.text(), "product");
    }

    #[tokio::test]
    async fn test_dont_cache_bypasses_both_paths() {
        let dir = TempDir::new().unwrap();
        let cache = create_test_cache(&dir);

        let req = request("https://store.steampowered.com/app/10/");
        cache.put(&req, &response_for(&req, 200, "old")).await.unwrap();

        let bypass = req.clone().bypass_cache();
        assert!(cache.get(&bypass).await.unwrap().is_none());

        let written = cache
            .put(&bypass, &response_for(&bypass, 200, "new"))
            .await
            .unwrap();
        assert!(!written);
        assert_eq!(cache.get(&req).await.unwrap().unwrap().text(), "old");
    }

    #[tokio::test]
    async fn test_dont_cache_never_writes() {
        let dir = TempDir::new().unwrap();
        let cache = create_test_cache(&dir);

        let req = request("https://store.steampowered.com/app/20/").bypass_cache();
        cache.put(&req, &response_for(&req, 200, "x")).await.unwrap();

        assert!(!dir.path().join("reviews").exists());
    }

    #[tokio::test]
    async fn test_ignored_status_not_stored() {
        let dir = TempDir::new().unwrap();
        let cache = create_test_cache(&dir);
        let req = request("https://store.steampowered.com/app/30/");

        let written = cache.put(&req, &response_for(&req, 302, "")).await.unwrap();
        assert!(!written);
        assert!(cache.get(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_put_keeps_entry() {
        let dir = TempDir::new().unwrap();
        let cache = create_test_cache(&dir);
        let req = request("https://store.steampowered.com/app/40/");

        assert!(cache.put(&req, &response_for(&req, 200, "first")).await.unwrap());
        assert!(cache.put(&req, &response_for(&req, 200, "first")).await.unwrap());
        assert_eq!(cache.get(&req).await.unwrap().unwrap().text(), "first");

        // no staging directories left behind
        let fp = req.fingerprint();
        let leftovers = std::fs::read_dir(dir.path().join("reviews").join(fp.prefix()))
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_corrupt_meta_is_an_error() {
        let dir = TempDir::new().unwrap();
        let cache = create_test_cache(&dir);
        let req = request("https://store.steampowered.com/app/50/");

        let entry = cache.entry_dir(&req.fingerprint());
        std::fs::create_dir_all(&entry).unwrap();
        std::fs::write(entry.join("meta.json"), "not json").unwrap();

        assert!(matches!(
            cache.get(&req).await,
            Err(CacheError::Metadata(_))
        ));
    }
}
