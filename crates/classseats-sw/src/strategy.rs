//! Fetch strategies.
//!
//! Pass-through needs no code: the agent simply doesn't respond and the
//! host performs the request itself.

use crate::cache::{CacheEntry, SharedCacheStorage};
use crate::manifest::{resolve_asset, SHELL_ASSETS};
use classseats_net::{Network, Request, Response};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use url::Url;

/// The one user-visible failure: 503 "Offline".
pub fn offline_response() -> Response {
    Response::new(StatusCode::SERVICE_UNAVAILABLE, "Offline")
        .status_text("Offline")
        .header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
}

/// Work that outlives the response it was started for.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn onto the current runtime and keep the handle.
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut handles = self.handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(tokio::spawn(task));
    }

    /// Wait for everything spawned so far.
    pub async fn flush(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task failed");
            }
        }
    }

    pub async fn pending(&self) -> usize {
        self.handles
            .lock()
            .await
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }
}

/// Concrete strategies over one cache version.
pub struct Strategies {
    scope: Url,
    cache_name: String,
    caches: SharedCacheStorage,
    network: Arc<dyn Network>,
    background: BackgroundTasks,
}

impl Strategies {
    pub fn new(
        scope: Url,
        cache_name: String,
        caches: SharedCacheStorage,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            scope,
            cache_name,
            caches,
            network,
            background: BackgroundTasks::new(),
        }
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    /// Current version first, then any retained older version.
    async fn lookup(&self, url: &Url) -> Option<Response> {
        self.caches
            .read()
            .await
            .match_preferring(&self.cache_name, url)
            .map(CacheEntry::to_response)
    }

    /// Connectivity probe: network only, no cache reads or writes.
    pub async fn probe(&self, request: &Request) -> Response {
        match self.network.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %request.url, error = %e, "Probe failed");
                offline_response()
            }
        }
    }

    /// Navigation: network first, any response wins; shell fallback offline.
    pub async fn navigate(&self, request: &Request) -> Response {
        match self.network.fetch(request).await {
            // Status is not inspected; a 404 page may still carry the shell.
            Ok(response) => return response,
            Err(e) => debug!(url = %request.url, error = %e, "Navigation offline"),
        }

        if let Some(cached) = self.lookup(&request.url).await {
            trace!(url = %request.url, "Navigation served from cache");
            return cached;
        }

        for alias in SHELL_ASSETS {
            let Ok(url) = resolve_asset(&self.scope, alias) else {
                continue;
            };
            if let Some(cached) = self.lookup(&url).await {
                debug!(url = %request.url, shell = %url, "Navigation served app shell");
                return cached;
            }
        }

        offline_response()
    }

    /// Static asset: cache first, refill on a 200 from the network.
    pub async fn cache_first(&self, request: &Request) -> Response {
        if let Some(cached) = self.lookup(&request.url).await {
            trace!(url = %request.url, "Cache hit");
            return cached;
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    self.refill(request.clone(), response.clone()).await;
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Static asset offline");
                // A concurrent refill may have landed meanwhile.
                match self.lookup(&request.url).await {
                    Some(cached) => cached,
                    None => offline_response(),
                }
            }
        }
    }

    async fn refill(&self, request: Request, response: Response) {
        let caches = Arc::clone(&self.caches);
        let cache_name = self.cache_name.clone();
        self.background
            .spawn(async move {
                let mut caches = caches.write().await;
                let Some(cache) = caches.get_mut(&cache_name) else {
                    debug!(url = %request.url, cache = %cache_name, "Cache evicted, refill dropped");
                    return;
                };
                match cache.put(&request, &response) {
                    Ok(()) => trace!(url = %request.url, cache = %cache_name, "Refilled"),
                    Err(e) => warn!(url = %request.url, error = %e, "Refill failed"),
                }
            })
            .await;
    }
}
