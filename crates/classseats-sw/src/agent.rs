//! The agent: one cache version plus its event handlers.
//!
//! Events arrive through [`ServiceWorkerAgent::dispatch`], which maps each
//! event kind to its handler. The returned future is the "keep me alive"
//! obligation: the host must drive it to completion before treating the
//! event as finished.

use crate::cache::SharedCacheStorage;
use crate::clients::SharedClients;
use crate::control::ControlMessage;
use crate::lifecycle::{ActivationReport, InstallReport, LifecycleManager, LifecycleState};
use crate::router::{Router, RoutingDecision};
use crate::strategy::Strategies;
use crate::ServiceWorkerError;
use classseats_common::AgentConfig;
use classseats_net::{Network, Request, Response};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Lifecycle and fetch events delivered by the host.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Message(Value),
    Fetch(Request),
}

/// Event kinds, for logging and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Message,
    Fetch,
}

impl WorkerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Install => EventKind::Install,
            Self::Activate => EventKind::Activate,
            Self::Message(_) => EventKind::Message,
            Self::Fetch(_) => EventKind::Fetch,
        }
    }
}

/// What a settled event produced.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    Message(ControlMessage),
    /// The agent answered the request.
    RespondWith(Response),
    /// The agent declined; the host performs the request unmodified.
    Passthrough(RoutingDecision),
}

impl EventOutcome {
    /// The response, if the agent produced one.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::RespondWith(response) => Some(response),
            _ => None,
        }
    }
}

/// A service worker instance bound to one revision.
pub struct ServiceWorkerAgent {
    config: Arc<AgentConfig>,
    lifecycle: LifecycleManager,
    router: Router,
    strategies: Strategies,
}

impl ServiceWorkerAgent {
    pub fn new(
        config: AgentConfig,
        caches: SharedCacheStorage,
        clients: SharedClients,
        network: Arc<dyn Network>,
    ) -> Self {
        let config = Arc::new(config);
        let lifecycle = LifecycleManager::new(
            Arc::clone(&config),
            Arc::clone(&caches),
            clients,
            Arc::clone(&network),
        );
        let router = Router::new(config.origin());
        let strategies = Strategies::new(config.scope.clone(), config.cache_name(), caches, network);

        Self {
            config,
            lifecycle,
            router,
            strategies,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn cache_name(&self) -> &str {
        self.lifecycle.cache_name()
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.state().await
    }

    /// Route an event to its handler.
    pub fn dispatch(&self, event: WorkerEvent) -> BoxFuture<'_, Result<EventOutcome, ServiceWorkerError>> {
        debug!(cache = %self.cache_name(), kind = ?event.kind(), "Dispatching event");
        match event {
            WorkerEvent::Install => async move {
                self.lifecycle.install().await.map(EventOutcome::Installed)
            }
            .boxed(),
            WorkerEvent::Activate => async move {
                self.lifecycle.activate().await.map(EventOutcome::Activated)
            }
            .boxed(),
            WorkerEvent::Message(payload) => {
                let message = self.handle_message(&payload);
                async move { Ok(EventOutcome::Message(message)) }.boxed()
            }
            WorkerEvent::Fetch(request) => async move { Ok(self.handle_fetch(&request).await) }.boxed(),
        }
    }

    /// Control channel; unknown messages are ignored.
    pub fn handle_message(&self, payload: &Value) -> ControlMessage {
        let message = ControlMessage::from_value(payload);
        match message {
            ControlMessage::SkipWaiting => self.lifecycle.skip_waiting(),
            ControlMessage::Unknown => debug!(%payload, "Ignoring control message"),
        }
        message
    }

    /// Route one request and run its strategy. Never fails.
    pub async fn handle_fetch(&self, request: &Request) -> EventOutcome {
        let decision = self.router.route(request);
        let response = match decision {
            RoutingDecision::ProbeNetwork => self.strategies.probe(request).await,
            RoutingDecision::NavigationFallback => self.strategies.navigate(request).await,
            RoutingDecision::StaticCacheFirst => self.strategies.cache_first(request).await,
            RoutingDecision::Skip | RoutingDecision::Ignore => {
                return EventOutcome::Passthrough(decision)
            }
        };
        EventOutcome::RespondWith(response)
    }

    /// Wait for background cache refills.
    pub async fn flush_background(&self) {
        self.strategies.background().flush().await;
    }
}
