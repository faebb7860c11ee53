//! In-process network with scripted responses.
//!
//! Used to simulate an origin that can be switched offline, and to observe
//! which URLs actually reached the network.

use crate::{NetError, Network, Request, Response};
use async_trait::async_trait;
use http::StatusCode;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::trace;
use url::Url;

/// Scripted [`Network`]: known URLs return their response, unknown URLs 404.
#[derive(Debug, Default)]
pub struct MemoryNetwork {
    routes: RwLock<HashMap<String, Response>>,
    failing: RwLock<HashSet<String>>,
    offline: AtomicBool,
    log: Mutex<Vec<Url>>,
}

fn route_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response for `url` (builder form, before sharing).
    pub fn with_route(mut self, url: &Url, response: Response) -> Self {
        self.routes
            .get_mut()
            .insert(route_key(url), response.with_url(url.clone()));
        self
    }

    /// Register or replace a response for `url`.
    pub async fn set_route(&self, url: &Url, response: Response) {
        self.routes
            .write()
            .await
            .insert(route_key(url), response.with_url(url.clone()));
    }

    /// Make requests for `url` fail as if the connection dropped.
    pub async fn fail(&self, url: &Url) {
        self.failing.write().await.insert(route_key(url));
    }

    /// Toggle connectivity for every URL.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// URLs that reached this network, in order.
    pub async fn requests(&self) -> Vec<Url> {
        self.log.lock().await.clone()
    }

    /// Number of requests that reached this network for `url`.
    pub async fn hits(&self, url: &Url) -> usize {
        let key = route_key(url);
        self.log
            .lock()
            .await
            .iter()
            .filter(|u| route_key(u) == key)
            .count()
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.log.lock().await.push(request.url.clone());

        if self.is_offline() {
            trace!(url = %request.url, "Offline");
            return Err(NetError::Unreachable(request.url.to_string()));
        }

        let key = route_key(&request.url);
        if self.failing.read().await.contains(&key) {
            return Err(NetError::RequestFailed(format!("connection reset: {key}")));
        }

        let response = match self.routes.read().await.get(&key) {
            Some(response) => response.clone(),
            None => Response::new(StatusCode::NOT_FOUND, "").with_url(request.url.clone()),
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("https://classseats.example/").unwrap().join(path).unwrap()
    }

    #[tokio::test]
    async fn test_routes_and_unknown_paths() {
        let network = MemoryNetwork::new().with_route(&url("/index.html"), Response::ok_with("shell"));

        let hit = network.fetch(&Request::get(url("/index.html"))).await.unwrap();
        assert_eq!(hit.text(), "shell");

        let miss = network.fetch(&Request::get(url("/nope"))).await.unwrap();
        assert_eq!(miss.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_offline_fails_and_logs() {
        let network = MemoryNetwork::new().with_route(&url("/ping.txt"), Response::ok_with("pong"));
        network.set_offline(true);

        let result = network.fetch(&Request::get(url("/ping.txt"))).await;
        assert!(matches!(result, Err(NetError::Unreachable(_))));
        assert_eq!(network.hits(&url("/ping.txt")).await, 1);
    }

    #[tokio::test]
    async fn test_failing_route() {
        let network = MemoryNetwork::new();
        network.fail(&url("/icons/icon-512.png")).await;

        let result = network.fetch(&Request::get(url("/icons/icon-512.png"))).await;
        assert!(matches!(result, Err(NetError::RequestFailed(_))));
    }

    #[tokio::test]
    async fn test_fragment_ignored() {
        let network = MemoryNetwork::new();
        network.set_route(&url("/app.js"), Response::ok_with("js")).await;

        let response = network.fetch(&Request::get(url("/app.js#v2"))).await.unwrap();
        assert_eq!(response.text(), "js");
    }
}
