//! Cache lifecycle: install, verify, activate, evict.
//!
//! ```text
//! Uninitialized ─install─► Installing ─shell ok─► Installed ─activate─► Active(Verified)
//!                              │                                 └────► Active(Degraded)
//!                              └─no shell─► Redundant
//! ```
//!
//! Only a verified activation deletes other cache versions.

use crate::cache::SharedCacheStorage;
use crate::clients::SharedClients;
use crate::manifest::{resolve_asset, ACTIVATE_SHELL_ASSETS, CORE_ASSETS, SHELL_ASSETS};
use crate::ServiceWorkerError;
use classseats_common::AgentConfig;
use classseats_net::{Network, Request};
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of the activate-time shell check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShellStatus {
    /// Shell present; older versions were evicted.
    Verified,
    /// Shell missing; older versions kept.
    Degraded,
}

/// Lifecycle state of one cache version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Installing,
    /// Installed, shell proven, waiting for activation.
    Installed,
    Active(ShellStatus),
    /// Install failed; never activates.
    Redundant,
}

/// Result of prefetching one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PrefetchOutcome {
    Stored { asset: &'static str, url: String },
    Rejected { asset: &'static str, status: u16 },
    Failed { asset: &'static str, error: String },
}

impl PrefetchOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

/// What a successful install did.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub cache_name: String,
    pub outcomes: Vec<PrefetchOutcome>,
    /// URL of the shell alias that proved the install.
    pub shell: String,
}

impl InstallReport {
    pub fn stored(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_stored()).count()
    }
}

/// What an activation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub cache_name: String,
    pub status: ShellStatus,
    pub evicted: Vec<String>,
    pub claimed: usize,
}

/// Owns creation and deletion of cache versions.
pub struct LifecycleManager {
    config: Arc<AgentConfig>,
    cache_name: String,
    caches: SharedCacheStorage,
    clients: SharedClients,
    network: Arc<dyn Network>,
    state: RwLock<LifecycleState>,
    skip_waiting: AtomicBool,
}

impl LifecycleManager {
    pub fn new(
        config: Arc<AgentConfig>,
        caches: SharedCacheStorage,
        clients: SharedClients,
        network: Arc<dyn Network>,
    ) -> Self {
        let cache_name = config.cache_name();
        Self {
            config,
            cache_name,
            caches,
            clients,
            network,
            state: RwLock::new(LifecycleState::Uninitialized),
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Ask to skip the waiting period.
    pub fn skip_waiting(&self) {
        if !self.skip_waiting.swap(true, Ordering::SeqCst) {
            info!(cache = %self.cache_name, "Skip waiting requested");
        }
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    async fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), ServiceWorkerError> {
        let mut state = self.state.write().await;
        if *state != from {
            return Err(ServiceWorkerError::state(format!(
                "cannot move to {to:?} from {:?}",
                *state
            )));
        }
        debug!(cache = %self.cache_name, ?from, ?to, "Lifecycle transition");
        *state = to;
        Ok(())
    }

    async fn set_state(&self, to: LifecycleState) {
        *self.state.write().await = to;
    }

    /// Provision the cache version and prove the shell made it in.
    pub async fn install(&self) -> Result<InstallReport, ServiceWorkerError> {
        self.transition(LifecycleState::Uninitialized, LifecycleState::Installing)
            .await?;
        info!(cache = %self.cache_name, "Installing");

        self.caches.write().await.open(&self.cache_name);

        let outcomes = self.prefetch().await;
        for outcome in outcomes.iter().filter(|o| !o.is_stored()) {
            warn!(cache = %self.cache_name, ?outcome, "Prefetch skipped");
        }

        match self.shell_proof(&SHELL_ASSETS).await? {
            Some(shell) => {
                self.set_state(LifecycleState::Installed).await;
                let report = InstallReport {
                    cache_name: self.cache_name.clone(),
                    outcomes,
                    shell: shell.into(),
                };
                info!(
                    cache = %self.cache_name,
                    stored = report.stored(),
                    shell = %report.shell,
                    "Installed"
                );
                Ok(report)
            }
            None => {
                self.set_state(LifecycleState::Redundant).await;
                warn!(cache = %self.cache_name, "Install failed: no cached app shell");
                Err(ServiceWorkerError::MissingAppShell {
                    cache_name: self.cache_name.clone(),
                })
            }
        }
    }

    /// Fetch every manifest entry concurrently; one outcome per entry.
    pub async fn prefetch(&self) -> Vec<PrefetchOutcome> {
        join_all(CORE_ASSETS.iter().map(|asset| self.prefetch_one(*asset))).await
    }

    async fn prefetch_one(&self, asset: &'static str) -> PrefetchOutcome {
        let url = match resolve_asset(&self.config.scope, asset) {
            Ok(url) => url,
            Err(e) => {
                return PrefetchOutcome::Failed {
                    asset,
                    error: e.to_string(),
                }
            }
        };

        let request = Request::get(url);
        let response = match self.network.fetch(&request).await {
            Ok(response) => response,
            Err(e) => {
                return PrefetchOutcome::Failed {
                    asset,
                    error: e.to_string(),
                }
            }
        };

        if !response.ok() {
            return PrefetchOutcome::Rejected {
                asset,
                status: response.status.as_u16(),
            };
        }

        let mut caches = self.caches.write().await;
        match caches.open(&self.cache_name).put(&request, &response) {
            Ok(()) => PrefetchOutcome::Stored {
                asset,
                url: request.url.into(),
            },
            Err(e) => PrefetchOutcome::Failed {
                asset,
                error: e.to_string(),
            },
        }
    }

    /// First alias present in this version's cache, in list order.
    pub async fn shell_proof(&self, aliases: &[&str]) -> Result<Option<Url>, ServiceWorkerError> {
        let caches = self.caches.read().await;
        let Some(cache) = caches.get(&self.cache_name) else {
            return Ok(None);
        };
        for alias in aliases {
            let url = resolve_asset(&self.config.scope, alias)?;
            if cache.match_url(&url).is_some() {
                return Ok(Some(url));
            }
        }
        Ok(None)
    }

    /// Re-verify the shell, evict other versions if verified, claim pages.
    pub async fn activate(&self) -> Result<ActivationReport, ServiceWorkerError> {
        {
            let state = self.state.read().await;
            if *state != LifecycleState::Installed {
                return Err(ServiceWorkerError::state(format!(
                    "cannot activate from {:?}",
                    *state
                )));
            }
        }
        info!(cache = %self.cache_name, "Activating");

        self.caches.write().await.open(&self.cache_name);

        if self.shell_proof(&ACTIVATE_SHELL_ASSETS).await?.is_none() {
            let claimed = self.claim_clients().await;
            self.set_state(LifecycleState::Active(ShellStatus::Degraded)).await;
            warn!(
                cache = %self.cache_name,
                claimed,
                "Activated without index document, keeping older caches"
            );
            return Ok(ActivationReport {
                cache_name: self.cache_name.clone(),
                status: ShellStatus::Degraded,
                evicted: Vec::new(),
                claimed,
            });
        }

        let evicted = self.evict_others().await;
        let claimed = self.claim_clients().await;
        self.set_state(LifecycleState::Active(ShellStatus::Verified)).await;
        info!(cache = %self.cache_name, evicted = evicted.len(), claimed, "Activated");

        Ok(ActivationReport {
            cache_name: self.cache_name.clone(),
            status: ShellStatus::Verified,
            evicted,
            claimed,
        })
    }

    async fn evict_others(&self) -> Vec<String> {
        let mut caches = self.caches.write().await;
        let stale: Vec<String> = caches
            .keys()
            .into_iter()
            .filter(|name| *name != self.cache_name)
            .collect();
        for name in &stale {
            caches.delete(name);
            debug!(cache = %name, "Evicted");
        }
        stale
    }

    async fn claim_clients(&self) -> usize {
        self.clients.write().await.claim(&self.cache_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStorage;
    use crate::clients::Clients;
    use classseats_net::{MemoryNetwork, Response};

    const SCOPE: &str = "https://classseats.example/";

    fn url(path: &str) -> Url {
        Url::parse(SCOPE).unwrap().join(path).unwrap()
    }

    fn manager(revision: &str, network: MemoryNetwork, caches: SharedCacheStorage) -> LifecycleManager {
        let config = AgentConfig::with_revision(Url::parse(SCOPE).unwrap(), revision).unwrap();
        LifecycleManager::new(
            Arc::new(config),
            caches,
            Clients::new().shared(),
            Arc::new(network),
        )
    }

    fn full_site() -> MemoryNetwork {
        CORE_ASSETS
            .iter()
            .fold(MemoryNetwork::new(), |net, asset| {
                net.with_route(&url(asset), Response::ok_with(format!("body of {asset}")))
            })
    }

    #[tokio::test]
    async fn test_install_stores_manifest() {
        let caches = CacheStorage::new().shared();
        let lifecycle = manager("r1", full_site(), caches.clone());

        let report = lifecycle.install().await.unwrap();
        assert_eq!(report.outcomes.len(), CORE_ASSETS.len());
        assert_eq!(report.stored(), CORE_ASSETS.len());
        assert_eq!(report.shell, url("/").as_str());
        assert_eq!(lifecycle.state().await, LifecycleState::Installed);

        let caches = caches.read().await;
        let cache = caches.get("classseats-pwa-r1").unwrap();
        // `/` and `./` resolve to the same URL at the origin root.
        assert_eq!(cache.len(), 6);
    }

    #[tokio::test]
    async fn test_install_tolerates_missing_icons() {
        let network = MemoryNetwork::new().with_route(&url("/index.html"), Response::ok_with("shell"));
        network.fail(&url("/icons/icon-512.png")).await;
        let lifecycle = manager("r1", network, CacheStorage::new().shared());

        let report = lifecycle.install().await.unwrap();
        assert_eq!(report.shell, url("/index.html").as_str());
        assert!(report
            .outcomes
            .iter()
            .any(|o| matches!(o, PrefetchOutcome::Failed { asset: "/icons/icon-512.png", .. })));
        assert!(report
            .outcomes
            .iter()
            .any(|o| matches!(o, PrefetchOutcome::Rejected { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_install_fails_without_shell() {
        let network =
            MemoryNetwork::new().with_route(&url("/manifest.webmanifest"), Response::ok_with("{}"));
        let lifecycle = manager("r1", network, CacheStorage::new().shared());

        let err = lifecycle.install().await.unwrap_err();
        assert!(matches!(err, ServiceWorkerError::MissingAppShell { .. }));
        assert_eq!(lifecycle.state().await, LifecycleState::Redundant);
        assert!(lifecycle.activate().await.is_err());
    }

    #[tokio::test]
    async fn test_install_twice_is_a_state_error() {
        let lifecycle = manager("r1", full_site(), CacheStorage::new().shared());
        lifecycle.install().await.unwrap();
        assert!(matches!(
            lifecycle.install().await,
            Err(ServiceWorkerError::StateError(_))
        ));
    }

    #[tokio::test]
    async fn test_activate_evicts_when_verified() {
        let caches = CacheStorage::new().shared();
        caches.write().await.open("classseats-pwa-old");

        let lifecycle = manager("r2", full_site(), caches.clone());
        lifecycle.install().await.unwrap();
        let report = lifecycle.activate().await.unwrap();

        assert_eq!(report.status, ShellStatus::Verified);
        assert_eq!(report.evicted, vec!["classseats-pwa-old".to_string()]);
        assert_eq!(caches.read().await.keys(), vec!["classseats-pwa-r2"]);
        assert_eq!(
            lifecycle.state().await,
            LifecycleState::Active(ShellStatus::Verified)
        );
    }

    #[tokio::test]
    async fn test_activate_with_root_alias_only_is_degraded() {
        let caches = CacheStorage::new().shared();
        caches.write().await.open("classseats-pwa-old");

        // Install is proven by `/`, activate only accepts index documents.
        let network = MemoryNetwork::new().with_route(&url("/"), Response::ok_with("shell"));
        let lifecycle = manager("r2", network, caches.clone());
        lifecycle.install().await.unwrap();
        let report = lifecycle.activate().await.unwrap();

        assert_eq!(report.status, ShellStatus::Degraded);
        assert!(report.evicted.is_empty());
        assert_eq!(
            caches.read().await.keys(),
            vec!["classseats-pwa-old", "classseats-pwa-r2"]
        );
    }

    #[tokio::test]
    async fn test_activate_claims_clients() {
        let clients = Clients::new().shared();
        clients.write().await.open(url("/dashboard"));

        let config = AgentConfig::with_revision(Url::parse(SCOPE).unwrap(), "r1").unwrap();
        let lifecycle = LifecycleManager::new(
            Arc::new(config),
            CacheStorage::new().shared(),
            clients.clone(),
            Arc::new(full_site()),
        );
        lifecycle.install().await.unwrap();
        let report = lifecycle.activate().await.unwrap();

        assert_eq!(report.claimed, 1);
        assert_eq!(clients.read().await.controlled_by("classseats-pwa-r1").len(), 1);
    }

    #[tokio::test]
    async fn test_skip_waiting_flag() {
        let lifecycle = manager("r1", MemoryNetwork::new(), CacheStorage::new().shared());
        assert!(!lifecycle.skip_waiting_requested());
        lifecycle.skip_waiting();
        lifecycle.skip_waiting();
        assert!(lifecycle.skip_waiting_requested());
    }
}
