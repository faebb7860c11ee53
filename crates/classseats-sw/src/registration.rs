//! Host side of a registration: waiting and active agents.
//!
//! A freshly installed agent waits while an older one still controls open
//! pages, unless the page posted `SKIP_WAITING` or no pages are open. An
//! agent whose install fails is discarded and the active one stays.

use crate::agent::{EventOutcome, ServiceWorkerAgent, WorkerEvent};
use crate::cache::{CacheStorage, SharedCacheStorage};
use crate::clients::{Clients, SharedClients};
use crate::control::ControlMessage;
use crate::lifecycle::{ActivationReport, InstallReport};
use crate::router::RoutingDecision;
use crate::ServiceWorkerError;
use classseats_common::AgentConfig;
use classseats_net::{Network, Request};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// A scope's registration.
pub struct Registration {
    scope: Url,
    caches: SharedCacheStorage,
    clients: SharedClients,
    network: Arc<dyn Network>,
    waiting: Option<Arc<ServiceWorkerAgent>>,
    active: Option<Arc<ServiceWorkerAgent>>,
}

impl Registration {
    /// Create a registration with empty cache storage.
    pub fn new(scope: Url, network: Arc<dyn Network>) -> Self {
        Self::with_storage(scope, CacheStorage::new().shared(), network)
    }

    /// Create a registration over existing cache storage.
    pub fn with_storage(scope: Url, caches: SharedCacheStorage, network: Arc<dyn Network>) -> Self {
        Self {
            scope,
            caches,
            clients: Clients::new().shared(),
            network,
            waiting: None,
            active: None,
        }
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn caches(&self) -> &SharedCacheStorage {
        &self.caches
    }

    pub fn clients(&self) -> &SharedClients {
        &self.clients
    }

    pub fn active(&self) -> Option<&Arc<ServiceWorkerAgent>> {
        self.active.as_ref()
    }

    pub fn waiting(&self) -> Option<&Arc<ServiceWorkerAgent>> {
        self.waiting.as_ref()
    }

    /// Install `revision`; activates it too if nothing needs to wait.
    pub async fn update(&mut self, revision: &str) -> Result<InstallReport, ServiceWorkerError> {
        let config = AgentConfig::with_revision(self.scope.clone(), revision)?;
        let agent = Arc::new(ServiceWorkerAgent::new(
            config,
            Arc::clone(&self.caches),
            Arc::clone(&self.clients),
            Arc::clone(&self.network),
        ));

        let report = match agent.dispatch(WorkerEvent::Install).await {
            Ok(EventOutcome::Installed(report)) => report,
            Ok(other) => {
                return Err(ServiceWorkerError::state(format!(
                    "unexpected install outcome: {other:?}"
                )))
            }
            Err(e) => {
                warn!(
                    revision,
                    active = ?self.active.as_ref().map(|a| a.cache_name().to_string()),
                    error = %e,
                    "Update rejected, keeping active version"
                );
                return Err(e);
            }
        };

        if let Some(old) = self.waiting.replace(agent) {
            debug!(cache = %old.cache_name(), "Waiting version superseded");
        }
        self.activate_if_ready().await?;
        Ok(report)
    }

    /// Deliver a page message to the newest agent.
    pub async fn post_message(&mut self, payload: &Value) -> Result<ControlMessage, ServiceWorkerError> {
        let Some(target) = self.waiting.as_ref().or(self.active.as_ref()) else {
            return Ok(ControlMessage::Unknown);
        };
        let message = target.handle_message(payload);
        self.activate_if_ready().await?;
        Ok(message)
    }

    /// A page was opened under this scope.
    pub async fn open_client(&self, url: Url) -> String {
        self.clients.write().await.open(url)
    }

    /// A page was closed; the waiting version may now activate.
    pub async fn close_client(&mut self, id: &str) -> Result<Option<ActivationReport>, ServiceWorkerError> {
        self.clients.write().await.close(id);
        self.activate_if_ready().await
    }

    async fn activate_if_ready(&mut self) -> Result<Option<ActivationReport>, ServiceWorkerError> {
        let Some(waiting) = self.waiting.as_ref() else {
            return Ok(None);
        };

        let ready = self.active.is_none()
            || waiting.lifecycle().skip_waiting_requested()
            || self.clients.read().await.is_empty();
        if !ready {
            debug!(cache = %waiting.cache_name(), "Waiting for open pages to close");
            return Ok(None);
        }

        self.activate_waiting().await.map(Some)
    }

    /// Promote the waiting agent unconditionally.
    pub async fn activate_waiting(&mut self) -> Result<ActivationReport, ServiceWorkerError> {
        let waiting = self
            .waiting
            .take()
            .ok_or_else(|| ServiceWorkerError::state("no waiting version"))?;

        // Pending refills must land before eviction runs.
        if let Some(current) = self.active.as_ref() {
            current.flush_background().await;
        }

        let report = match waiting.dispatch(WorkerEvent::Activate).await? {
            EventOutcome::Activated(report) => report,
            other => {
                return Err(ServiceWorkerError::state(format!(
                    "unexpected activate outcome: {other:?}"
                )))
            }
        };

        if let Some(old) = self.active.replace(waiting) {
            info!(from = %old.cache_name(), to = %report.cache_name, "Active version replaced");
        }
        Ok(report)
    }

    /// Intercept a request through the active agent.
    pub async fn fetch(&self, request: Request) -> EventOutcome {
        match self.active.as_ref() {
            Some(agent) => agent.handle_fetch(&request).await,
            None => EventOutcome::Passthrough(RoutingDecision::Skip),
        }
    }

    /// Wait for the active agent's background refills.
    pub async fn flush(&self) {
        if let Some(agent) = self.active.as_ref() {
            agent.flush_background().await;
        }
    }
}
