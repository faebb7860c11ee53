//! Origin/external classification.

use url::{Origin, Url};

/// Identity provider, storage and API hosts, matched anywhere in the URL.
pub const EXTERNAL_HOST_PATTERNS: [&str; 4] = [
    "googleapis.com",
    "googleusercontent.com",
    "accounts.google.com",
    "gstatic.com",
];

/// The app's sync backend.
pub const CLOUD_FUNCTION_HOST: &str = "classseats-sync.cloudfunctions.net";

/// Decides which requests belong to someone else and must pass through.
#[derive(Debug, Clone)]
pub struct ExternalClassifier {
    origin: Origin,
    patterns: Vec<String>,
}

impl ExternalClassifier {
    /// Classifier for the agent's own origin with the built-in patterns.
    pub fn new(origin: Origin) -> Self {
        let patterns = EXTERNAL_HOST_PATTERNS
            .iter()
            .chain(std::iter::once(&CLOUD_FUNCTION_HOST))
            .map(|p| p.to_string())
            .collect();
        Self { origin, patterns }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// True for a foreign origin or any URL containing a bypass pattern.
    pub fn is_external(&self, url: &Url) -> bool {
        url.origin() != self.origin || self.matches_pattern(url)
    }

    fn matches_pattern(&self, url: &Url) -> bool {
        let href = url.as_str();
        self.patterns.iter().any(|p| href.contains(p.as_str()))
    }
}

/// One-shot form of [`ExternalClassifier::is_external`].
pub fn is_external(url: &Url, origin: &Origin) -> bool {
    ExternalClassifier::new(origin.clone()).is_external(url)
}
