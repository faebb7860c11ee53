//! Versioned cache storage.
//!
//! ```text
//! CacheStorage (caches)
//!     └── Cache ("classseats-pwa-<revision>")
//!             └── GET url → CacheEntry
//! ```

use crate::ServiceWorkerError;
use classseats_net::{Request, Response};
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

/// Cache storage shared by every task of an agent, and across versions.
pub type SharedCacheStorage = Arc<RwLock<CacheStorage>>;

/// Canonical key: absolute URL without fragment.
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// A cached GET response snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response status text.
    pub status_text: String,

    /// Response headers in order; repeated names appear once per value.
    pub headers: Vec<(String, Vec<u8>)>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a response for `url`.
    pub fn from_response(url: &Url, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();

        Self {
            url: cache_key(url),
            status: response.status.as_u16(),
            status_text: response.status_text.clone(),
            headers,
            body: response.body.to_vec(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild the response this entry was taken from.
    pub fn to_response(&self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_bytes(value),
            ) {
                (Ok(n), Ok(v)) => {
                    headers.append(n, v);
                }
                _ => warn!(url = %self.url, header = %name, "Dropping unrestorable header"),
            }
        }

        Response {
            url: Url::parse(&self.url).ok(),
            status,
            status_text: self.status_text.clone(),
            headers,
            body: self.body.clone().into(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A single cache version.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries by canonical URL.
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Look up a URL.
    pub fn match_url(&self, url: &Url) -> Option<&CacheEntry> {
        self.entries.get(&cache_key(url))
    }

    /// Store a response for a GET request; replaces any previous entry.
    pub fn put(&mut self, request: &Request, response: &Response) -> Result<(), ServiceWorkerError> {
        if request.method != Method::GET {
            return Err(ServiceWorkerError::cache(format!(
                "refusing to cache {} {}",
                request.method, request.url
            )));
        }
        let entry = CacheEntry::from_response(&request.url, response);
        self.entries.insert(entry.url.clone(), entry);
        Ok(())
    }

    /// Delete entry.
    pub fn delete(&mut self, url: &Url) -> bool {
        self.entries.remove(&cache_key(url)).is_some()
    }

    /// Get all keys (URLs), sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache storage (caches global).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap for sharing between tasks.
    pub fn shared(self) -> SharedCacheStorage {
        Arc::new(RwLock::new(self))
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get an existing cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Mutable access to an existing cache without creating it.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Cache> {
        self.caches.get_mut(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Get all cache names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Match across all caches in name order.
    pub fn match_url(&self, url: &Url) -> Option<&CacheEntry> {
        self.keys()
            .iter()
            .filter_map(|name| self.caches.get(name.as_str()))
            .find_map(|cache| cache.match_url(url))
    }

    /// Match in `preferred` first, then across the other caches.
    pub fn match_preferring(&self, preferred: &str, url: &Url) -> Option<&CacheEntry> {
        self.caches
            .get(preferred)
            .and_then(|cache| cache.match_url(url))
            .or_else(|| self.match_url(url))
    }

    /// Serialize the whole store.
    pub fn to_json(&self) -> Result<String, ServiceWorkerError> {
        serde_json::to_string(self).map_err(|e| ServiceWorkerError::cache(e.to_string()))
    }

    /// Restore a store serialized with [`CacheStorage::to_json`].
    pub fn from_json(json: &str) -> Result<Self, ServiceWorkerError> {
        serde_json::from_str(json).map_err(|e| ServiceWorkerError::cache(e.to_string()))
    }

    /// Persist to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ServiceWorkerError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)
            .map_err(|e| ServiceWorkerError::cache(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), caches = self.caches.len(), "Cache storage saved");
        Ok(())
    }

    /// Load from a file; a missing file yields an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServiceWorkerError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "No saved cache storage, starting empty");
                Ok(Self::new())
            }
            Err(e) => Err(ServiceWorkerError::cache(format!("{}: {e}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{CONTENT_TYPE, SET_COOKIE, VARY};

    fn url(path: &str) -> Url {
        Url::parse("https://classseats.example/").unwrap().join(path).unwrap()
    }

    fn png() -> Response {
        Response::ok_with(vec![0x89, b'P', b'N', b'G'])
            .header(CONTENT_TYPE, HeaderValue::from_static("image/png"))
    }

    #[test]
    fn test_cache_put_and_match() {
        let mut cache = Cache::new("v1");
        cache.put(&Request::get(url("/icons/icon-192.png")), &png()).unwrap();

        let entry = cache.match_url(&url("/icons/icon-192.png")).unwrap();
        assert_eq!(entry.status, 200);
        assert_eq!(
            entry.headers,
            vec![("content-type".to_string(), b"image/png".to_vec())]
        );
        assert!(cache.match_url(&url("/icons/icon-512.png")).is_none());
    }

    #[test]
    fn test_cache_key_ignores_fragment() {
        let mut cache = Cache::new("v1");
        cache.put(&Request::get(url("/index.html#top")), &png()).unwrap();
        assert!(cache.match_url(&url("/index.html")).is_some());
    }

    #[test]
    fn test_cache_rejects_non_get() {
        let mut cache = Cache::new("v1");
        let request = Request::post(url("/api/seats"), "{}".into());
        assert!(cache.put(&request, &png()).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_put_replaces() {
        let mut cache = Cache::new("v1");
        let request = Request::get(url("/app.js"));
        cache.put(&request, &Response::ok_with("old")).unwrap();
        cache.put(&request, &Response::ok_with("new")).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.match_url(&url("/app.js")).unwrap().body, b"new");
    }

    #[test]
    fn test_cache_delete() {
        let mut cache = Cache::new("v1");
        cache.put(&Request::get(url("/app.css")), &png()).unwrap();
        assert!(cache.delete(&url("/app.css")));
        assert!(!cache.delete(&url("/app.css")));
    }

    #[test]
    fn test_entry_round_trips_response() {
        let original = png();
        let entry = CacheEntry::from_response(&url("/icons/icon-192.png"), &original);
        let restored = entry.to_response();

        assert_eq!(restored.status, original.status);
        assert_eq!(restored.body, original.body);
        assert_eq!(restored.headers.get(CONTENT_TYPE), original.headers.get(CONTENT_TYPE));
    }

    #[test]
    fn test_entry_keeps_repeated_and_opaque_headers() {
        let mut original = Response::ok_with("ok");
        original.headers.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        original.headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        original
            .headers
            .append(VARY, HeaderValue::from_bytes(b"accept-\xe9ncoding").unwrap());

        let entry = CacheEntry::from_response(&url("/index.html"), &original);
        let json = serde_json::to_string(&entry).unwrap();
        let restored: CacheEntry = serde_json::from_str(&json).unwrap();
        let response = restored.to_response();

        let cookies: Vec<&str> = response
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(
            response.headers.get(VARY).unwrap().as_bytes(),
            b"accept-\xe9ncoding"
        );
    }

    #[test]
    fn test_cache_storage() {
        let mut storage = CacheStorage::new();

        assert!(!storage.has("v1"));

        storage.open("v1");
        assert!(storage.has("v1"));

        assert!(storage.delete("v1"));
        assert!(!storage.has("v1"));
    }

    #[test]
    fn test_storage_keys_sorted() {
        let mut storage = CacheStorage::new();
        storage.open("classseats-pwa-b");
        storage.open("classseats-pwa-a");
        assert_eq!(storage.keys(), vec!["classseats-pwa-a", "classseats-pwa-b"]);
    }

    #[test]
    fn test_match_preferring_current() {
        let mut storage = CacheStorage::new();
        let request = Request::get(url("/index.html"));
        storage.open("a").put(&request, &Response::ok_with("old shell")).unwrap();
        storage.open("b").put(&request, &Response::ok_with("new shell")).unwrap();

        assert_eq!(storage.match_url(&url("/index.html")).unwrap().body, b"old shell");
        assert_eq!(
            storage.match_preferring("b", &url("/index.html")).unwrap().body,
            b"new shell"
        );
        // Falls back to other versions when the preferred one misses.
        storage.open("c");
        assert_eq!(
            storage.match_preferring("c", &url("/index.html")).unwrap().body,
            b"old shell"
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caches.json");

        let mut storage = CacheStorage::new();
        storage
            .open("classseats-pwa-r1")
            .put(&Request::get(url("/index.html")), &Response::ok_with("<html>"))
            .unwrap();
        storage.save(&path).unwrap();

        let loaded = CacheStorage::load(&path).unwrap();
        assert_eq!(loaded.keys(), vec!["classseats-pwa-r1"]);
        assert_eq!(
            loaded.match_url(&url("/index.html")).unwrap().body,
            b"<html>"
        );
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CacheStorage::load(dir.path().join("none.json")).unwrap();
        assert!(loaded.keys().is_empty());
    }
}
