//! Request routing.

use crate::classify::ExternalClassifier;
use crate::manifest::{is_static_path, PROBE_PATH};
use classseats_net::Request;
use http::Method;
use serde::Serialize;
use tracing::debug;
use url::Origin;

/// Strategy chosen for one intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RoutingDecision {
    /// Not intercepted (non-GET or uninteresting path).
    Skip,
    /// Connectivity probe: always network.
    ProbeNetwork,
    /// Page navigation: network first, shell fallback.
    NavigationFallback,
    /// Static asset: cache first, refill from network.
    StaticCacheFirst,
    /// External host: never intercepted.
    Ignore,
}

impl RoutingDecision {
    /// Whether the agent answers this request itself.
    pub fn intercepts(self) -> bool {
        matches!(
            self,
            Self::ProbeNetwork | Self::NavigationFallback | Self::StaticCacheFirst
        )
    }
}

/// Classifies requests; pure, recomputed per request.
#[derive(Debug, Clone)]
pub struct Router {
    classifier: ExternalClassifier,
}

impl Router {
    pub fn new(origin: Origin) -> Self {
        Self {
            classifier: ExternalClassifier::new(origin),
        }
    }

    pub fn classifier(&self) -> &ExternalClassifier {
        &self.classifier
    }

    pub fn route(&self, request: &Request) -> RoutingDecision {
        let decision = self.decide(request);
        debug!(url = %request.url, method = %request.method, ?decision, "Routed");
        decision
    }

    fn decide(&self, request: &Request) -> RoutingDecision {
        if request.method != Method::GET {
            return RoutingDecision::Skip;
        }

        let path = request.url.path();
        if path == PROBE_PATH {
            return RoutingDecision::ProbeNetwork;
        }

        if self.classifier.is_external(&request.url) {
            return RoutingDecision::Ignore;
        }

        if request.is_navigation() {
            return RoutingDecision::NavigationFallback;
        }

        if is_static_path(path) {
            return RoutingDecision::StaticCacheFirst;
        }

        RoutingDecision::Skip
    }
}
