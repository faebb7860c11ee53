//! Controlled pages.

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

/// Clients shared between the registration and its agents.
pub type SharedClients = Arc<RwLock<Clients>>;

/// An open page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Cache version of the agent controlling this page, if any.
    pub controller: Option<String>,
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap for sharing.
    pub fn shared(self) -> SharedClients {
        Arc::new(RwLock::new(self))
    }

    /// Track a newly opened page; it starts uncontrolled.
    pub fn open(&mut self, url: Url) -> String {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed));
        self.clients.insert(
            id.clone(),
            Client {
                id: id.clone(),
                url,
                controller: None,
            },
        );
        id
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Remove a client.
    pub fn close(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Take control of every open page; returns how many changed controller.
    pub fn claim(&mut self, controller: &str) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if client.controller.as_deref() != Some(controller) {
                client.controller = Some(controller.to_string());
                claimed += 1;
            }
        }
        claimed
    }

    /// Pages currently controlled by `controller`.
    pub fn controlled_by(&self, controller: &str) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|c| c.controller.as_deref() == Some(controller))
            .collect()
    }
}
