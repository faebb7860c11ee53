//! Agent configuration

use crate::{CommonError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::{Origin, Url};

/// Revision baked in by the build system.
pub const BUILD_REVISION: &str = match option_env!("CLASSSEATS_BUILD_REV") {
    Some(rev) => rev,
    None => "ee696af6e74f2fe51eaa1f6d08c110ffadb72cff",
};

/// Prefix shared by every cache version this agent creates.
pub const CACHE_PREFIX: &str = "classseats-pwa-";

const SCOPE_ENV: &str = "CLASSSEATS_SCOPE";
const REVISION_ENV: &str = "CLASSSEATS_REVISION";

/// Immutable configuration injected into the agent at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Registration scope; relative aliases like `./index.html` resolve here.
    pub scope: Url,

    /// Build revision naming the cache version.
    #[serde(default = "default_revision")]
    pub revision: String,
}

fn default_revision() -> String {
    BUILD_REVISION.to_string()
}

impl AgentConfig {
    /// Create a configuration for `scope` using the built-in revision.
    pub fn new(scope: Url) -> Result<Self> {
        Self::with_revision(scope, BUILD_REVISION)
    }

    /// Create a configuration with an explicit revision.
    pub fn with_revision(scope: Url, revision: impl Into<String>) -> Result<Self> {
        let config = Self {
            scope,
            revision: revision.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document such as `{"scope": "https://app.example/"}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CommonError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Load from `CLASSSEATS_SCOPE` and optional `CLASSSEATS_REVISION`.
    pub fn from_env() -> Result<Self> {
        let scope = std::env::var(SCOPE_ENV)
            .map_err(|_| CommonError::config(format!("{SCOPE_ENV} is not set")))?;
        let scope = Url::parse(&scope)?;
        let revision = std::env::var(REVISION_ENV).unwrap_or_else(|_| default_revision());
        Self::with_revision(scope, revision)
    }

    /// Check invariants the rest of the agent relies on.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.scope.scheme(), "http" | "https") {
            return Err(CommonError::config(format!(
                "scope must be http(s), got {}",
                self.scope.scheme()
            )));
        }
        if !self.scope.path().ends_with('/') {
            return Err(CommonError::config("scope must end with '/'"));
        }
        if self.revision.trim().is_empty() {
            return Err(CommonError::config("revision must not be empty"));
        }
        Ok(())
    }

    /// Origin the agent serves.
    pub fn origin(&self) -> Origin {
        self.scope.origin()
    }

    /// Name of the cache version owned by this revision.
    pub fn cache_name(&self) -> String {
        format!("{CACHE_PREFIX}{}", self.revision)
    }
}
