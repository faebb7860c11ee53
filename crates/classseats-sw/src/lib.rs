//! # ClassSeats Service Worker
//!
//! Offline caching agent for the ClassSeats progressive web app.
//!
//! ## Features
//!
//! - **Lifecycle**: install prefetches a versioned cache and proves the app
//!   shell is present; activate evicts older versions only when verified
//! - **Routing**: every intercepted request is classified once and handed
//!   to one fetch strategy
//! - **Strategies**: connectivity probe, navigation network-first, static
//!   cache-first with background refill
//! - **Control channel**: `{ "type": "SKIP_WAITING" }` from the page
//!
//! ## Architecture
//!
//! ```text
//! Registration (host side)
//!     ├── waiting (ServiceWorkerAgent)
//!     └── active  (ServiceWorkerAgent)
//!             ├── LifecycleManager ── CacheStorage (versioned caches)
//!             ├── Router ──────────── ExternalClassifier
//!             └── Strategies ──────── Network
//! ```

use thiserror::Error;

pub mod agent;
pub mod cache;
pub mod classify;
pub mod clients;
pub mod control;
pub mod lifecycle;
pub mod manifest;
pub mod registration;
pub mod router;
pub mod strategy;

pub use agent::{EventKind, EventOutcome, ServiceWorkerAgent, WorkerEvent};
pub use cache::{Cache, CacheEntry, CacheStorage, SharedCacheStorage};
pub use classify::ExternalClassifier;
pub use clients::{Client, Clients, SharedClients};
pub use control::ControlMessage;
pub use lifecycle::{
    ActivationReport, InstallReport, LifecycleManager, LifecycleState, PrefetchOutcome,
    ShellStatus,
};
pub use registration::Registration;
pub use router::{Router, RoutingDecision};
pub use strategy::{offline_response, Strategies};

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Install failed: no cached app shell in {cache_name}")]
    MissingAppShell { cache_name: String },

    #[error("State error: {0}")]
    StateError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Config error: {0}")]
    Config(#[from] classseats_common::CommonError),
}

impl ServiceWorkerError {
    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::StateError(message.into())
    }

    pub(crate) fn cache(message: impl Into<String>) -> Self {
        Self::CacheError(message.into())
    }
}
